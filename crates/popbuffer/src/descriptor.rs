//! Mesh descriptor parsing and level arithmetic.
//!
//! The descriptor is a small JSON document written next to the binary
//! payload by the exporter:
//!
//! ```json
//! {
//!   "name": "bunny",
//!   "numVertices": 100,
//!   "verticesPerFace": 3,
//!   "xmin": -0.5, "xmax": 0.3,
//!   "ymin": 0.1,  "ymax": 0.9,
//!   "zmin": -0.3, "zmax": 0.3,
//!   "levelCount": 3,
//!   "levels": [30, 70, 100],
//!   "data": "bunny.pop"
//! }
//! ```
//!
//! All level addressing goes through [`MeshDescriptor::level_range`] so the
//! fetch and commit paths agree on offsets.

use std::ops::Range;

use glam::DVec3;
use popbuffer_decode::{BYTES_PER_VERTEX, Bounds, POSITION_SCALE};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::range::ByteRange;

/// Vertices per face the pipeline can draw.
const TRIANGLE_VERTICES: u32 = 3;

/// Validated, immutable description of a progressive mesh.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeshDescriptor {
    name: String,
    num_vertices: u32,
    vertices_per_face: u32,
    xmin: f64,
    xmax: f64,
    ymin: f64,
    ymax: f64,
    zmin: f64,
    zmax: f64,
    level_count: u32,
    levels: Vec<u32>,
    #[serde(rename = "data")]
    data_file_name: String,
}

/// Wire form of the descriptor, before validation.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDescriptor {
    name: String,
    num_vertices: VertexCount,
    #[serde(default)]
    vertices_per_face: Option<u32>,
    xmin: f64,
    xmax: f64,
    ymin: f64,
    ymax: f64,
    zmin: f64,
    zmax: f64,
    #[serde(default)]
    level_count: Option<u32>,
    #[serde(default)]
    levels: Option<Vec<u32>>,
    data: String,
    #[serde(default)]
    factor: Option<f64>,
}

/// The exporter writes `numVertices` quoted; newer files use a number.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum VertexCount {
    Number(u32),
    Text(String),
}

impl VertexCount {
    fn value(&self) -> Result<u32> {
        match self {
            Self::Number(n) => Ok(*n),
            Self::Text(s) => s.trim().parse().map_err(|e| Error::Parse {
                context: "numVertices",
                message: format!("{s:?}: {e}"),
            }),
        }
    }
}

impl MeshDescriptor {
    /// Parse and validate a descriptor from its JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] for malformed JSON and
    /// [`Error::InvalidDescriptor`] when the level table or bounds violate
    /// their invariants.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let raw: RawDescriptor = serde_json::from_slice(bytes)?;
        Self::from_raw(raw)
    }

    /// Build a descriptor directly, validating it the same way as parsing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDescriptor`] on invariant violations.
    pub fn new(
        name: impl Into<String>,
        bounds: Bounds,
        levels: Vec<u32>,
        data_file_name: impl Into<String>,
    ) -> Result<Self> {
        let num_vertices = levels.last().copied().unwrap_or(0);
        #[allow(clippy::cast_possible_truncation)]
        let level_count = levels.len() as u32;
        let descriptor = Self {
            name: name.into(),
            num_vertices,
            vertices_per_face: TRIANGLE_VERTICES,
            xmin: bounds.min.x,
            xmax: bounds.max.x,
            ymin: bounds.min.y,
            ymax: bounds.max.y,
            zmin: bounds.min.z,
            zmax: bounds.max.z,
            level_count,
            levels,
            data_file_name: data_file_name.into(),
        };
        descriptor.validate()?;
        Ok(descriptor)
    }

    fn from_raw(raw: RawDescriptor) -> Result<Self> {
        let num_vertices = raw.num_vertices.value()?;

        if let Some(factor) = raw.factor.filter(|f| (f - POSITION_SCALE).abs() > f64::EPSILON) {
            return Err(invalid(format!(
                "unsupported quantization factor {factor}, expected {POSITION_SCALE}"
            )));
        }

        // A descriptor without a level table is a single-level asset.
        let levels = raw.levels.unwrap_or_else(|| vec![num_vertices]);
        #[allow(clippy::cast_possible_truncation)]
        let table_len = levels.len() as u32;
        let level_count = match raw.level_count {
            Some(count) if count != table_len => {
                return Err(invalid(format!(
                    "levelCount is {count} but levels has {table_len} entries"
                )));
            }
            Some(count) => count,
            None => table_len,
        };

        let descriptor = Self {
            name: raw.name,
            num_vertices,
            vertices_per_face: raw.vertices_per_face.unwrap_or(TRIANGLE_VERTICES),
            xmin: raw.xmin,
            xmax: raw.xmax,
            ymin: raw.ymin,
            ymax: raw.ymax,
            zmin: raw.zmin,
            zmax: raw.zmax,
            level_count,
            levels,
            data_file_name: raw.data,
        };
        descriptor.validate()?;
        Ok(descriptor)
    }

    fn validate(&self) -> Result<()> {
        if self.vertices_per_face != TRIANGLE_VERTICES {
            return Err(invalid(format!(
                "verticesPerFace must be {TRIANGLE_VERTICES}, got {}",
                self.vertices_per_face
            )));
        }
        if self.levels.is_empty() {
            return Err(invalid("levels must not be empty".to_string()));
        }
        if let Some(pos) = self.levels.windows(2).position(|w| w[0] >= w[1]) {
            return Err(invalid(format!(
                "levels must be strictly increasing, but levels[{pos}] = {} >= levels[{}] = {}",
                self.levels[pos],
                pos + 1,
                self.levels[pos + 1]
            )));
        }
        if self.levels[0] == 0 {
            return Err(invalid("the first level must contain vertices".to_string()));
        }
        let last = self.levels[self.levels.len() - 1];
        if last != self.num_vertices {
            return Err(invalid(format!(
                "last level is {last} but numVertices is {}",
                self.num_vertices
            )));
        }
        let axes = [
            ("x", self.xmin, self.xmax),
            ("y", self.ymin, self.ymax),
            ("z", self.zmin, self.zmax),
        ];
        for (axis, min, max) in axes {
            if !min.is_finite() || !max.is_finite() {
                return Err(invalid(format!("{axis} bounds are not finite")));
            }
            if max < min {
                return Err(invalid(format!("{axis}max {max} is below {axis}min {min}")));
            }
        }
        if self.data_file_name.is_empty() {
            return Err(invalid("data file name is empty".to_string()));
        }
        Ok(())
    }

    /// Mesh name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Total vertex count across all levels.
    #[must_use]
    pub fn num_vertices(&self) -> u32 {
        self.num_vertices
    }

    /// Vertices per face (always 3).
    #[must_use]
    pub fn vertices_per_face(&self) -> u32 {
        self.vertices_per_face
    }

    /// Number of levels of detail.
    #[must_use]
    pub fn level_count(&self) -> u32 {
        self.level_count
    }

    /// Cumulative vertex counts, one per level.
    #[must_use]
    pub fn levels(&self) -> &[u32] {
        &self.levels
    }

    /// Payload file name, relative to the descriptor.
    #[must_use]
    pub fn data_file_name(&self) -> &str {
        &self.data_file_name
    }

    /// Quantization bounds.
    #[must_use]
    pub fn bounds(&self) -> Bounds {
        Bounds::new(
            DVec3::new(self.xmin, self.ymin, self.zmin),
            DVec3::new(self.xmax, self.ymax, self.zmax),
        )
    }

    /// Whether any axis of the bounding box has zero extent.
    #[must_use]
    pub fn has_degenerate_axis(&self) -> bool {
        self.xmin == self.xmax || self.ymin == self.ymax || self.zmin == self.zmax
    }

    /// Size of the whole payload in bytes.
    #[must_use]
    pub fn payload_len(&self) -> u64 {
        u64::from(self.num_vertices) * BYTES_PER_VERTEX as u64
    }

    /// Vertex range `[begin, end)` covered by the 1-based `level`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidLevel`] if `level` is outside `1..=level_count`.
    pub fn level_range(&self, level: u32) -> Result<Range<u32>> {
        if level == 0 || level > self.level_count {
            return Err(Error::InvalidLevel {
                level,
                level_count: self.level_count,
            });
        }
        let index = (level - 1) as usize;
        let begin = if index == 0 { 0 } else { self.levels[index - 1] };
        Ok(begin..self.levels[index])
    }

    /// Byte range to request for `level`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidLevel`] if `level` is outside `1..=level_count`.
    pub fn level_byte_range(&self, level: u32) -> Result<ByteRange> {
        let range = self.level_range(level)?;
        ByteRange::for_vertices(range.start, Some(range.end), BYTES_PER_VERTEX)
    }

    /// Cumulative vertex count once `level` is loaded (0 for level 0).
    #[must_use]
    pub fn vertices_through(&self, level: u32) -> u32 {
        match level {
            0 => 0,
            l => self.levels[(l.min(self.level_count) - 1) as usize],
        }
    }

    /// Resolve the payload URL against the URL the descriptor came from.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] if either URL is malformed.
    pub fn payload_url(&self, descriptor_url: &str) -> Result<String> {
        let base = reqwest::Url::parse(descriptor_url).map_err(|e| Error::Parse {
            context: "descriptor url",
            message: format!("{descriptor_url}: {e}"),
        })?;
        let url = base.join(&self.data_file_name).map_err(|e| Error::Parse {
            context: "payload url",
            message: format!("{}: {e}", self.data_file_name),
        })?;
        Ok(url.into())
    }
}

fn invalid(detail: String) -> Error {
    Error::InvalidDescriptor { detail }
}
