//! Update shapes and how they are picked
//!
//! The store reports "changed fields" differently depending on which fields an
//! update touches, and the bug class under test is sensitive to that. Each
//! [`UpdateShape`] is one structurally distinct update; a [`ShapeSelector`]
//! decides which one each update uses.

use bson::doc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use feedcheck_core::fields::{SCALAR_FIELD, TIMESTAMP_FIELD};
use feedcheck_core::{Marker, UpdateSpec};

/// Structurally distinct update forms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateShape {
    /// `$set` scalar, timestamp and tag
    SetAll,
    /// `$set` scalar and tag, `$unset` timestamp
    UnsetDate,
    /// `$set` tag only, `$unset` scalar and timestamp
    TagOnly,
}

impl UpdateShape {
    /// Every variant, in selection order
    pub const ALL: [UpdateShape; 3] = [
        UpdateShape::SetAll,
        UpdateShape::UnsetDate,
        UpdateShape::TagOnly,
    ];

    /// Build the update that writes `marker` into `tag`.
    ///
    /// `aux` feeds the scalar field and `now` the timestamp field, for the
    /// shapes that set them.
    pub fn build(&self, tag: &str, marker: Marker, aux: i64, now: bson::DateTime) -> UpdateSpec {
        match self {
            UpdateShape::SetAll => UpdateSpec {
                set: doc! {
                    SCALAR_FIELD: aux,
                    TIMESTAMP_FIELD: now,
                    tag: marker.as_i64(),
                },
                unset: vec![],
            },
            UpdateShape::UnsetDate => UpdateSpec {
                set: doc! {
                    SCALAR_FIELD: aux,
                    tag: marker.as_i64(),
                },
                unset: vec![TIMESTAMP_FIELD.to_string()],
            },
            UpdateShape::TagOnly => UpdateSpec {
                set: doc! { tag: marker.as_i64() },
                unset: vec![SCALAR_FIELD.to_string(), TIMESTAMP_FIELD.to_string()],
            },
        }
    }
}

/// Chooses the shape of each update
pub trait ShapeSelector: Send {
    /// Shape for the update at `index` within its phase
    fn select(&mut self, index: usize) -> UpdateShape;
}

/// Uniformly random shapes
pub struct UniformShapes {
    rng: StdRng,
}

impl UniformShapes {
    /// Reproducible sequence for `seed`
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Sequence seeded from OS entropy
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }
}

impl ShapeSelector for UniformShapes {
    fn select(&mut self, _index: usize) -> UpdateShape {
        UpdateShape::ALL[self.rng.gen_range(0..UpdateShape::ALL.len())]
    }
}

/// Always the same shape
pub struct FixedShape(pub UpdateShape);

impl ShapeSelector for FixedShape {
    fn select(&mut self, _index: usize) -> UpdateShape {
        self.0
    }
}

/// Round-robin over every shape
#[derive(Default)]
pub struct CyclingShapes {
    next: usize,
}

impl ShapeSelector for CyclingShapes {
    fn select(&mut self, _index: usize) -> UpdateShape {
        let shape = UpdateShape::ALL[self.next % UpdateShape::ALL.len()];
        self.next += 1;
        shape
    }
}

/// Configurable choice of [`ShapeSelector`]
///
/// ```toml
/// [shapes]
/// kind = "uniform"   # or "fixed" / "cycle"
/// seed = 7           # uniform only, optional
/// # shape = "tag_only"  # fixed only
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ShapeStrategy {
    /// [`UniformShapes`]; seeded per pass when `seed` is set
    Uniform {
        /// Base seed; pass `n` uses `seed + n`
        #[serde(default)]
        seed: Option<u64>,
    },
    /// [`FixedShape`]
    Fixed {
        /// The shape every update uses
        shape: UpdateShape,
    },
    /// [`CyclingShapes`]
    Cycle,
}

impl Default for ShapeStrategy {
    fn default() -> Self {
        ShapeStrategy::Uniform { seed: None }
    }
}

impl ShapeStrategy {
    /// Selector for pass number `pass`
    pub fn selector(&self, pass: u64) -> Box<dyn ShapeSelector> {
        match self {
            ShapeStrategy::Uniform { seed: Some(seed) } => {
                Box::new(UniformShapes::seeded(seed.wrapping_add(pass)))
            }
            ShapeStrategy::Uniform { seed: None } => Box::new(UniformShapes::from_entropy()),
            ShapeStrategy::Fixed { shape } => Box::new(FixedShape(*shape)),
            ShapeStrategy::Cycle => Box::new(CyclingShapes::default()),
        }
    }
}
