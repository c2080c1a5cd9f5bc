//! Stand-in for the host's seeded random number generator.

use crate::codec::{require_int, ObjectCodec};
use crate::copy::TraversalPath;
use crate::value::{Brand, HostObject, Table, Value};
use crate::{host_object, Result, SaveDataError};

/// Xorshift32 generator whose seed is its entire observable state.
///
/// A zero seed would lock the generator at zero, so it is coerced to 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rng {
    seed: u32,
}

host_object!(Rng, Rng::CLASS_NAME);

impl Rng {
    pub const CLASS_NAME: &'static str = "RNG";

    pub fn new(seed: u32) -> Self {
        let mut rng = Self { seed: 1 };
        rng.set_seed(seed);
        rng
    }

    pub fn seed(&self) -> u32 {
        self.seed
    }

    pub fn set_seed(&mut self, seed: u32) {
        self.seed = if seed == 0 { 1 } else { seed };
    }

    pub fn next_u32(&mut self) -> u32 {
        let mut x = self.seed;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.seed = x;
        x
    }

    /// Uniform float in `[0, 1)`.
    pub fn next_float(&mut self) -> f64 {
        f64::from(self.next_u32()) / (f64::from(u32::MAX) + 1.0)
    }

    /// Uniform integer in `[0, max)`; always 0 when `max` is 0.
    pub fn next_int(&mut self, max: u32) -> u32 {
        if max == 0 {
            0
        } else {
            self.next_u32() % max
        }
    }
}

impl From<Rng> for Value {
    fn from(rng: Rng) -> Self {
        Value::object(rng)
    }
}

/// Flattens an [`Rng`] to its seed and re-seeds a fresh generator on the way back.
#[derive(Debug, Default)]
pub struct RngCodec;

impl ObjectCodec for RngCodec {
    fn class_name(&self) -> &str {
        Rng::CLASS_NAME
    }

    fn brand(&self) -> Brand {
        Brand::Rng
    }

    fn fields(&self, object: &dyn HostObject, path: &TraversalPath<'_>) -> Result<Table> {
        let rng = object
            .as_any()
            .downcast_ref::<Rng>()
            .ok_or_else(|| SaveDataError::unsupported(object.class_name(), path.to_string()))?;

        let mut fields = Table::new();
        fields.insert("seed", i64::from(rng.seed()));
        Ok(fields)
    }

    fn from_fields(&self, fields: Table, path: &TraversalPath<'_>) -> Result<Box<dyn HostObject>> {
        let seed = require_int(&fields, Brand::Rng, "seed", path)?;
        let seed = u32::try_from(seed).map_err(|_| {
            SaveDataError::malformed(Brand::Rng, path.to_string(), format!("seed {seed} is out of range"))
        })?;
        Ok(Box::new(Rng::new(seed)))
    }
}
