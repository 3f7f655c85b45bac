//! Hazard values supplied as a CSV table, joined onto network elements
//! by identifier.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use crate::HazardError;

/// Hazard values keyed by element identifier.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JoinTable {
    network_id_field: String,
    values: HashMap<String, Option<f64>>,
}

impl JoinTable {
    /// Reads a CSV file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or a named column is
    /// missing.
    pub fn read(
        path: &Path,
        id_field: &str,
        value_field: &str,
        network_id_field: &str,
    ) -> Result<Self, HazardError> {
        let file = std::fs::File::open(path)?;
        let table = Self::from_reader(file, id_field, value_field, network_id_field)?;
        log::info!(
            "Read {} hazard rows from {}",
            table.values.len(),
            path.display()
        );
        Ok(table)
    }

    /// Reads CSV data with a header row. Empty or non-numeric values are
    /// stored as no data.
    ///
    /// # Errors
    ///
    /// Returns an error on malformed CSV or if a named column is missing.
    pub fn from_reader<R: Read>(
        reader: R,
        id_field: &str,
        value_field: &str,
        network_id_field: &str,
    ) -> Result<Self, HazardError> {
        let mut csv = csv::Reader::from_reader(reader);
        let headers = csv.headers()?.clone();
        let column = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim() == name)
                .ok_or_else(|| HazardError::MissingAttribute {
                    attribute: name.to_string(),
                    element: "hazard table header".to_string(),
                })
        };
        let id_col = column(id_field)?;
        let value_col = column(value_field)?;

        let mut values = HashMap::new();
        for record in csv.records() {
            let record = record?;
            let Some(id) = record.get(id_col).map(str::trim).filter(|s| !s.is_empty()) else {
                continue;
            };
            let value = record
                .get(value_col)
                .and_then(|v| v.trim().parse::<f64>().ok())
                .filter(|v| v.is_finite());
            if values.insert(id.to_string(), value).is_some() {
                log::warn!("Duplicate hazard table id {id}, keeping the last row");
            }
        }

        Ok(Self {
            network_id_field: network_id_field.to_string(),
            values,
        })
    }

    /// Edge attribute whose value is looked up in the table.
    #[must_use]
    pub fn network_id_field(&self) -> &str {
        &self.network_id_field
    }

    /// Value for an id: `None` if the id is absent, `Some(None)` for a row
    /// without a usable value.
    #[must_use]
    pub fn lookup(&self, id: &str) -> Option<Option<f64>> {
        self.values.get(id).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = "link,depth,note\n7,0.8,a\n8,,b\n9,deep,c\n";

    #[test]
    fn reads_values_and_blanks() {
        let table = JoinTable::from_reader(CSV.as_bytes(), "link", "depth", "osm_id").unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.lookup("7"), Some(Some(0.8)));
        assert_eq!(table.lookup("8"), Some(None));
        assert_eq!(table.lookup("9"), Some(None));
        assert_eq!(table.lookup("10"), None);
        assert_eq!(table.network_id_field(), "osm_id");
    }

    #[test]
    fn missing_column_is_an_error() {
        let err = JoinTable::from_reader(CSV.as_bytes(), "link", "velocity", "osm_id");
        assert!(matches!(err, Err(HazardError::MissingAttribute { attribute, .. }) if attribute == "velocity"));
    }
}
