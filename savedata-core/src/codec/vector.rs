//! Stand-in for the host's two-dimensional vector type.

use crate::codec::{require_f64, ObjectCodec};
use crate::copy::TraversalPath;
use crate::value::{Brand, HostObject, Table, Value};
use crate::{host_object, Result, SaveDataError};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vector {
    pub x: f64,
    pub y: f64,
}

host_object!(Vector, Vector::CLASS_NAME);

impl Vector {
    pub const CLASS_NAME: &'static str = "Vector";

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl From<Vector> for Value {
    fn from(vector: Vector) -> Self {
        Value::object(vector)
    }
}

#[derive(Debug, Default)]
pub struct VectorCodec;

impl ObjectCodec for VectorCodec {
    fn class_name(&self) -> &str {
        Vector::CLASS_NAME
    }

    fn brand(&self) -> Brand {
        Brand::Vector
    }

    fn fields(&self, object: &dyn HostObject, path: &TraversalPath<'_>) -> Result<Table> {
        let vector = object
            .as_any()
            .downcast_ref::<Vector>()
            .ok_or_else(|| SaveDataError::unsupported(object.class_name(), path.to_string()))?;

        let mut fields = Table::new();
        fields.insert("x", vector.x);
        fields.insert("y", vector.y);
        Ok(fields)
    }

    fn from_fields(&self, fields: Table, path: &TraversalPath<'_>) -> Result<Box<dyn HostObject>> {
        let x = require_f64(&fields, Brand::Vector, "x", path)?;
        let y = require_f64(&fields, Brand::Vector, "y", path)?;
        Ok(Box::new(Vector::new(x, y)))
    }
}
