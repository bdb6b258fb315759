//! Per-droplet records and the per-specimen table they form.

use crate::data::schema::{self, DESCRIPTORS};
use crate::data::table::{Table, Value};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Shape descriptors of one droplet, as reported by the measurement tool.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShapeDescriptors {
    pub area: Option<f64>,
    pub perimeter: Option<f64>,
    pub circularity: Option<f64>,
    pub feret_diameter: Option<f64>,
    pub feret_x: Option<f64>,
    pub feret_y: Option<f64>,
    pub feret_angle: Option<f64>,
    pub min_feret: Option<f64>,
    pub aspect_ratio: Option<f64>,
    pub roundness: Option<f64>,
    pub solidity: Option<f64>,
    pub min_threshold: Option<f64>,
    pub max_threshold: Option<f64>,
}

impl ShapeDescriptors {
    /// Build from values in [`DESCRIPTORS`] order.
    pub fn from_values(v: [Option<f64>; DESCRIPTORS.len()]) -> Self {
        Self {
            area: v[0],
            perimeter: v[1],
            circularity: v[2],
            feret_diameter: v[3],
            feret_x: v[4],
            feret_y: v[5],
            feret_angle: v[6],
            min_feret: v[7],
            aspect_ratio: v[8],
            roundness: v[9],
            solidity: v[10],
            min_threshold: v[11],
            max_threshold: v[12],
        }
    }

    /// Values in [`DESCRIPTORS`] order.
    pub fn values(&self) -> [Option<f64>; DESCRIPTORS.len()] {
        [
            self.area,
            self.perimeter,
            self.circularity,
            self.feret_diameter,
            self.feret_x,
            self.feret_y,
            self.feret_angle,
            self.min_feret,
            self.aspect_ratio,
            self.roundness,
            self.solidity,
            self.min_threshold,
            self.max_threshold,
        ]
    }
}

/// One segmented lipid droplet after merging both measurement sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropletRecord {
    /// One-based droplet index, unique within a specimen.
    pub label: i64,
    /// Coordinate data: a scalar centroid or a serialized outline.
    pub x: Value,
    pub y: Value,
    pub descriptors: ShapeDescriptors,
}

impl DropletRecord {
    /// Cells in [`schema::droplet_columns`] order.
    pub fn to_row(&self) -> Vec<Value> {
        let mut row = Vec::with_capacity(3 + DESCRIPTORS.len());
        row.push(Value::Number(self.label as f64));
        row.push(self.x.clone());
        row.push(self.y.clone());
        row.extend(self.descriptors.values().into_iter().map(Value::from_option));
        row
    }
}

/// The merged droplet records of one specimen.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecimenTable {
    /// Specimen the records belong to.
    pub specimen: String,
    /// Records in descriptor-source order.
    pub records: Vec<DropletRecord>,
}

impl SpecimenTable {
    /// Number of droplets.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Labels in order.
    pub fn labels(&self) -> Vec<i64> {
        self.records.iter().map(|r| r.label).collect()
    }

    /// The fixed droplet projection as a table.
    pub fn to_table(&self) -> Result<Table> {
        Table::with_rows(
            schema::droplet_columns(),
            self.records.iter().map(DropletRecord::to_row).collect(),
        )
    }

    /// Write the merged table.
    pub fn to_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.to_table()?.to_csv(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(label: i64, area: f64, feret: f64) -> DropletRecord {
        DropletRecord {
            label,
            x: Value::Number(1.0),
            y: Value::Text("[2, 3]".into()),
            descriptors: ShapeDescriptors {
                area: Some(area),
                feret_diameter: Some(feret),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_descriptor_values_order() {
        let mut values = [None; DESCRIPTORS.len()];
        values[0] = Some(10.0);
        values[3] = Some(5.0);
        values[12] = Some(255.0);
        let d = ShapeDescriptors::from_values(values);
        assert_eq!(d.area, Some(10.0));
        assert_eq!(d.feret_diameter, Some(5.0));
        assert_eq!(d.max_threshold, Some(255.0));
        assert_eq!(d.values(), values);
    }

    #[test]
    fn test_to_table_projection() {
        let table = SpecimenTable {
            specimen: "fish01".into(),
            records: vec![record(1, 10.0, 5.0), record(2, 12.0, 6.0)],
        }
        .to_table()
        .unwrap();

        assert_eq!(table.n_columns(), 16);
        assert_eq!(table.n_rows(), 2);
        let area = table.column_index("area").unwrap();
        let feret = table.column_index("feret_diameter").unwrap();
        assert_eq!(table.rows()[1][area], Value::Number(12.0));
        assert_eq!(table.rows()[0][feret], Value::Number(5.0));
        assert!(table.rows()[0][table.column_index("solidity").unwrap()].is_missing());
    }
}
