use crate::services::storage::{
    CLEAN_EXPORT_FILE, OSM_EXPORT_FILE, RESULT_FILE, StorageError, StorageService,
};
use serde_json::{Map, Value, json};
use std::sync::Arc;
use thiserror::Error;

pub const GENERATOR: &str = concat!("building-detector ", env!("CARGO_PKG_VERSION"));

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("No detection result available")]
    MissingResult,

    #[error("Invalid detection result: {0}")]
    InvalidGeoJson(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Properties shared by both export flavours
#[derive(Debug, Clone)]
pub struct ExportContext {
    pub source_label: String,
    /// `YYYY-MM-DD`
    pub date: String,
}

impl ExportContext {
    pub fn today(source_label: &str) -> Self {
        Self {
            source_label: source_label.to_string(),
            date: chrono::Local::now().format("%Y-%m-%d").to_string(),
        }
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn feature_area(feature: &Value) -> f64 {
    feature
        .get("properties")
        .and_then(|p| p.get("area"))
        .and_then(Value::as_f64)
        .unwrap_or(0.0)
}

fn features(collection: &Value) -> Result<&Vec<Value>, ExportError> {
    collection
        .get("features")
        .and_then(Value::as_array)
        .ok_or_else(|| ExportError::InvalidGeoJson("missing 'features' array".to_string()))
}

fn collection_with(source: &Value, features: Vec<Value>) -> Map<String, Value> {
    let mut out = Map::new();
    out.insert("type".to_string(), json!("FeatureCollection"));
    if let Some(crs) = source.get("crs") {
        out.insert("crs".to_string(), crs.clone());
    }
    out.insert("features".to_string(), Value::Array(features));
    out
}

fn with_properties(feature: &Value, properties: Map<String, Value>) -> Value {
    let mut feature = feature.clone();
    if let Some(obj) = feature.as_object_mut() {
        obj.insert("properties".to_string(), Value::Object(properties));
    }
    feature
}

/// Strips each feature down to the fixed clean schema. Geometry is untouched.
pub fn clean_collection(source: &Value, ctx: &ExportContext) -> Result<Value, ExportError> {
    let features = features(source)?
        .iter()
        .map(|feature| {
            let mut props = Map::new();
            props.insert("building".to_string(), json!("yes"));
            props.insert("source".to_string(), json!(ctx.source_label));
            props.insert("source:date".to_string(), json!(ctx.date));
            props.insert("area".to_string(), json!(round1(feature_area(feature))));
            with_properties(feature, props)
        })
        .collect();

    Ok(Value::Object(collection_with(source, features)))
}

/// Parses the caller's tag overrides. Anything that is not a JSON object is
/// logged and ignored so the defaults apply.
pub fn parse_tag_overrides(raw: Option<&str>) -> Map<String, Value> {
    let Some(raw) = raw.filter(|r| !r.trim().is_empty()) else {
        return Map::new();
    };

    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(tags)) => tags,
        Ok(other) => {
            tracing::warn!("Ignoring tags parameter that is not a JSON object: {}", other);
            Map::new()
        }
        Err(e) => {
            tracing::warn!("Invalid JSON in tags parameter: {}", e);
            Map::new()
        }
    }
}

/// Applies OSM tags to every feature: caller overrides first, then defaults
/// for `building`, `source` and `source:date`, plus a `note` describing the
/// detected area.
pub fn osm_collection(
    source: &Value,
    overrides: &Map<String, Value>,
    ctx: &ExportContext,
) -> Result<Value, ExportError> {
    let mut base = overrides.clone();
    base.entry("building").or_insert_with(|| json!("yes"));
    base.entry("source").or_insert_with(|| json!(ctx.source_label));
    base.entry("source:date").or_insert_with(|| json!(ctx.date));

    let features = features(source)?
        .iter()
        .map(|feature| {
            let mut tags = base.clone();
            let area = feature_area(feature);
            if area > 0.0 && !tags.contains_key("note") {
                tags.insert(
                    "note".to_string(),
                    json!(format!("Detected building footprint, area {:.1} m²", area)),
                );
            }
            with_properties(feature, tags)
        })
        .collect();

    let mut out = collection_with(source, features);
    out.insert("generator".to_string(), json!(GENERATOR));
    Ok(Value::Object(out))
}

/// Recomputes the downloadable exports from the stored detection result on
/// every call.
pub struct ExportService {
    storage: Arc<StorageService>,
    source_label: String,
}

impl ExportService {
    pub fn new(storage: Arc<StorageService>, source_label: String) -> Self {
        Self {
            storage,
            source_label,
        }
    }

    async fn load_result(&self) -> Result<Value, ExportError> {
        let raw = match self.storage.read(RESULT_FILE).await {
            Ok(raw) => raw,
            Err(StorageError::NotFound(_)) => return Err(ExportError::MissingResult),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&raw).map_err(|e| ExportError::InvalidGeoJson(e.to_string()))
    }

    async fn persist(&self, name: &str, value: &Value) -> Result<Vec<u8>, ExportError> {
        let encoded =
            serde_json::to_vec(value).map_err(|e| ExportError::InvalidGeoJson(e.to_string()))?;
        self.storage.write_atomic(name, encoded.clone()).await?;
        Ok(encoded)
    }

    pub async fn export_clean(&self) -> Result<Vec<u8>, ExportError> {
        let source = self.load_result().await?;
        let ctx = ExportContext::today(&self.source_label);
        let clean = clean_collection(&source, &ctx)?;
        self.persist(CLEAN_EXPORT_FILE, &clean).await
    }

    pub async fn export_osm(&self, tags: Option<&str>) -> Result<Vec<u8>, ExportError> {
        let source = self.load_result().await?;
        let overrides = parse_tag_overrides(tags);
        let ctx = ExportContext::today(&self.source_label);
        let osm = osm_collection(&source, &overrides, &ctx)?;
        self.persist(OSM_EXPORT_FILE, &osm).await
    }
}
