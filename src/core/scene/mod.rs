//! Scene context analysis: executor state queries, normalisation, TTL
//! caching with hot selection counts, and derived proportion data.

use crate::core::cancel::CancelToken;
use crate::core::error::AppError;
use crate::core::executor::{ExecutorChannel, ExecutorRequest};
use serde::Serialize;
use serde_json::Value;
use signalbox_types::Mode;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::warn;

/// One object in the scene.
#[derive(Debug, Clone, Serialize)]
pub struct ObjectInfo {
    pub kind: String,
    pub dimensions: [f64; 3],
    pub location: [f64; 3],
}

/// Mesh topology and selection counts.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TopologyInfo {
    pub total_verts: u64,
    pub total_edges: u64,
    pub total_faces: u64,
    pub selected_verts: u64,
    pub selected_edges: u64,
    pub selected_faces: u64,
    pub has_selection: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
    Z,
}

/// Proportions derived from the active object's dimensions.
#[derive(Debug, Clone, Serialize)]
pub struct ProportionInfo {
    pub min_dim: f64,
    pub max_dim: f64,
    pub width: f64,
    pub height: f64,
    pub depth: f64,
    pub aspect_xy: f64,
    pub aspect_xz: f64,
    pub aspect_yz: f64,
    pub is_flat: bool,
    pub is_tall: bool,
    pub dominant_axis: Axis,
}

impl ProportionInfo {
    /// Deterministic derivation from `[width, depth, height]` dimensions.
    pub fn from_dimensions(dimensions: [f64; 3]) -> ProportionInfo {
        let [width, depth, height] = dimensions;
        let min_dim = width.min(depth).min(height);
        let max_dim = width.max(depth).max(height);
        let ratio = |a: f64, b: f64| if b > 0.0 { a / b } else { 0.0 };
        let dominant_axis = if width >= depth && width >= height {
            Axis::X
        } else if depth >= width && depth >= height {
            Axis::Y
        } else {
            Axis::Z
        };
        ProportionInfo {
            min_dim,
            max_dim,
            width,
            height,
            depth,
            aspect_xy: ratio(width, depth),
            aspect_xz: ratio(width, height),
            aspect_yz: ratio(depth, height),
            is_flat: min_dim > 0.0 && max_dim / min_dim >= 5.0,
            is_tall: height >= 2.0 * width.max(depth),
            dominant_axis,
        }
    }

    /// Name of the shape pattern these proportions resemble, if any.
    pub fn pattern(&self) -> Option<&'static str> {
        if self.is_tall {
            return Some("tower_like");
        }
        if self.is_flat {
            let mut dims = [self.width, self.depth, self.height];
            dims.sort_by(|a, b| a.partial_cmp(b).expect("finite dims"));
            let mid = dims[1];
            if mid > 0.0 && dims[2] / mid <= 3.0 {
                return Some("phone_like");
            }
            return Some("flat_slab");
        }
        if self.min_dim > 0.0 && self.max_dim / self.min_dim <= 1.5 {
            return Some("cube_like");
        }
        None
    }
}

/// Snapshot of executor state consumed by matching, expansion, and the
/// firewall.
#[derive(Debug, Clone, Serialize)]
pub struct SceneContext {
    pub mode: Mode,
    pub active_object: Option<String>,
    pub objects: HashMap<String, ObjectInfo>,
    pub topology: TopologyInfo,
    pub proportions: Option<ProportionInfo>,
    /// Set when the executor was unreachable and this context is
    /// best-effort.
    pub degraded: bool,
}

impl SceneContext {
    /// Context used when the executor cannot be reached.
    pub fn degraded() -> SceneContext {
        SceneContext {
            mode: Mode::Unknown,
            active_object: None,
            objects: HashMap::new(),
            topology: TopologyInfo::default(),
            proportions: None,
            degraded: true,
        }
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn has_object(&self, name: &str) -> bool {
        self.objects.contains_key(name)
    }

    pub fn pattern(&self) -> Option<&'static str> {
        self.proportions.as_ref().and_then(ProportionInfo::pattern)
    }
}

fn normalize_mode(raw: &str) -> Mode {
    match raw.trim().to_lowercase().as_str() {
        "object" => Mode::Object,
        "edit" | "edit_mesh" => Mode::Edit,
        "sculpt" => Mode::Sculpt,
        _ => Mode::Unknown,
    }
}

fn parse_triple(value: Option<&Value>) -> [f64; 3] {
    let mut out = [0.0; 3];
    if let Some(Value::Array(items)) = value {
        for (slot, item) in out.iter_mut().zip(items.iter()) {
            *slot = item.as_f64().unwrap_or(0.0);
        }
    }
    out
}

fn parse_count(topology: &Value, field: &str) -> u64 {
    topology.get(field).and_then(Value::as_u64).unwrap_or(0)
}

struct CachedScene {
    context: SceneContext,
    fetched_at: Instant,
}

/// Analyzer over the opaque executor channel with a TTL cache. Selection
/// counts are hot data and get refreshed even on cache hits.
pub struct SceneAnalyzer {
    executor: Arc<dyn ExecutorChannel>,
    ttl: Duration,
    deadline: Duration,
    cache: Mutex<Option<CachedScene>>,
}

impl SceneAnalyzer {
    pub fn new(executor: Arc<dyn ExecutorChannel>, ttl: Duration, deadline: Duration) -> Self {
        SceneAnalyzer {
            executor,
            ttl,
            deadline,
            cache: Mutex::new(None),
        }
    }

    /// Pure normalisation of a raw executor payload; the testing seam.
    pub fn analyze_from(data: &Value) -> SceneContext {
        let mode = data
            .get("mode")
            .and_then(Value::as_str)
            .map(normalize_mode)
            .unwrap_or(Mode::Unknown);
        let active_object = data
            .get("active_object")
            .and_then(Value::as_str)
            .map(str::to_string);

        let mut objects = HashMap::new();
        if let Some(Value::Object(map)) = data.get("objects") {
            for (name, info) in map {
                objects.insert(
                    name.clone(),
                    ObjectInfo {
                        kind: info
                            .get("type")
                            .and_then(Value::as_str)
                            .unwrap_or("MESH")
                            .to_string(),
                        dimensions: parse_triple(info.get("dimensions")),
                        location: parse_triple(info.get("location")),
                    },
                );
            }
        }

        let raw_topology = data.get("topology").cloned().unwrap_or(Value::Null);
        let selected_verts = parse_count(&raw_topology, "selected_verts");
        let selected_edges = parse_count(&raw_topology, "selected_edges");
        let selected_faces = parse_count(&raw_topology, "selected_faces");
        let topology = TopologyInfo {
            total_verts: parse_count(&raw_topology, "total_verts"),
            total_edges: parse_count(&raw_topology, "total_edges"),
            total_faces: parse_count(&raw_topology, "total_faces"),
            selected_verts,
            selected_edges,
            selected_faces,
            has_selection: selected_verts + selected_edges + selected_faces > 0,
        };

        let proportions = active_object
            .as_ref()
            .and_then(|name| objects.get(name))
            .map(|object| ProportionInfo::from_dimensions(object.dimensions));

        SceneContext {
            mode,
            active_object,
            objects,
            topology,
            proportions,
            degraded: false,
        }
    }

    /// Current scene context, degraded when the executor is unreachable,
    /// times out, or the request was cancelled.
    pub async fn analyze(&self, cancel: &CancelToken) -> SceneContext {
        if cancel.is_cancelled() {
            return SceneContext::degraded();
        }

        let cached = {
            let guard = self.cache.lock().expect("scene cache poisoned");
            guard.as_ref().and_then(|entry| {
                (entry.fetched_at.elapsed() < self.ttl).then(|| entry.context.clone())
            })
        };

        if let Some(mut context) = cached {
            self.refresh_selection(&mut context).await;
            return context;
        }

        let context = match self.query(ExecutorRequest::SceneState).await {
            Ok(payload) => Self::analyze_from(&payload),
            Err(err) => {
                warn!(error = %err, "scene query failed; using degraded context");
                return SceneContext::degraded();
            }
        };

        let mut guard = self.cache.lock().expect("scene cache poisoned");
        *guard = Some(CachedScene {
            context: context.clone(),
            fetched_at: Instant::now(),
        });
        context
    }

    async fn refresh_selection(&self, context: &mut SceneContext) {
        match self.query(ExecutorRequest::SelectionCounts).await {
            Ok(payload) => {
                let selected_verts = parse_count(&payload, "selected_verts");
                let selected_edges = parse_count(&payload, "selected_edges");
                let selected_faces = parse_count(&payload, "selected_faces");
                context.topology.selected_verts = selected_verts;
                context.topology.selected_edges = selected_edges;
                context.topology.selected_faces = selected_faces;
                context.topology.has_selection =
                    selected_verts + selected_edges + selected_faces > 0;

                let mut guard = self.cache.lock().expect("scene cache poisoned");
                if let Some(entry) = guard.as_mut() {
                    entry.context.topology = context.topology.clone();
                }
            }
            Err(err) => {
                warn!(error = %err, "selection refresh failed; keeping cached counts");
            }
        }
    }

    async fn query(&self, request: ExecutorRequest) -> Result<Value, AppError> {
        match tokio::time::timeout(self.deadline, self.executor.query(request)).await {
            Ok(result) => result,
            Err(_) => Err(AppError::new(
                signalbox_types::ErrorCategory::TimeoutError,
                "executor query deadline expired",
            )
            .with_code("RTR-SCN-001")),
        }
    }
}
