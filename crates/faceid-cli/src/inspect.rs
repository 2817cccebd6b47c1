//! `faceid inspect`: read-only report on the persisted index/label pair.

use faceid_core::store::Inspection;
use serde::Serialize;
use std::fmt::Write as _;

#[derive(Debug, Clone, Copy)]
pub struct ReportOptions {
    pub show_vectors: bool,
    /// Leading components printed per vector.
    pub dims: usize,
}

#[derive(Debug, Serialize)]
pub struct Report {
    pub index_present: bool,
    pub labels_present: bool,
    pub vector_count: usize,
    pub label_count: usize,
    pub dimension: Option<usize>,
    pub policy: Option<String>,
    pub index_generation: Option<u64>,
    pub labels_generation: Option<u64>,
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub entries: Vec<Entry>,
}

#[derive(Debug, Serialize)]
pub struct Entry {
    pub position: usize,
    pub label: Option<String>,
    pub vector: Option<Vec<f32>>,
}

impl Report {
    pub fn build(inspection: &Inspection, options: ReportOptions) -> Self {
        let entries = if options.show_vectors {
            entries(inspection, options.dims)
        } else {
            Vec::new()
        };
        Self {
            index_present: inspection.index.is_some(),
            labels_present: inspection.labels.is_some(),
            vector_count: inspection.vector_count(),
            label_count: inspection.label_count(),
            dimension: inspection.dimension(),
            policy: inspection.index.as_ref().map(|a| a.policy.to_string()),
            index_generation: inspection.index.as_ref().map(|a| a.generation),
            labels_generation: inspection.labels.as_ref().map(|a| a.generation),
            warnings: inspection.warnings(),
            entries,
        }
    }

    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let opt = |v: Option<String>| v.unwrap_or_else(|| "-".to_string());

        let _ = writeln!(out, "index file:   {}", presence(self.index_present));
        let _ = writeln!(out, "labels file:  {}", presence(self.labels_present));
        let _ = writeln!(out, "vectors:      {}", self.vector_count);
        let _ = writeln!(out, "labels:       {}", self.label_count);
        let _ = writeln!(out, "dimension:    {}", opt(self.dimension.map(|d| d.to_string())));
        let _ = writeln!(out, "policy:       {}", opt(self.policy.clone()));
        let _ = writeln!(
            out,
            "generation:   index={} labels={}",
            opt(self.index_generation.map(|g| g.to_string())),
            opt(self.labels_generation.map(|g| g.to_string()))
        );
        for warning in &self.warnings {
            let _ = writeln!(out, "WARNING: {warning}");
        }

        for entry in &self.entries {
            let label = entry.label.as_deref().unwrap_or("<no label>");
            match &entry.vector {
                Some(v) => {
                    let shown: Vec<String> = v.iter().map(|x| format!("{x:.4}")).collect();
                    let _ = writeln!(out, "{:>5}  {label}  [{}]", entry.position, shown.join(", "));
                }
                None => {
                    let _ = writeln!(out, "{:>5}  {label}  <no vector>", entry.position);
                }
            }
        }
        out
    }
}

fn presence(present: bool) -> &'static str {
    if present {
        "present"
    } else {
        "missing"
    }
}

/// Pair labels with vectors by position, covering the longer of the two.
fn entries(inspection: &Inspection, dims: usize) -> Vec<Entry> {
    let count = inspection.vector_count().max(inspection.label_count());
    let mut vectors = inspection.index.as_ref().map(|a| a.index.vectors());
    (0..count)
        .map(|position| Entry {
            position,
            label: inspection
                .labels
                .as_ref()
                .and_then(|a| a.labels.get(position))
                .map(str::to_string),
            vector: vectors
                .as_mut()
                .and_then(Iterator::next)
                .map(|v| v.iter().take(dims).copied().collect()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use faceid_core::database::FaceDatabase;
    use faceid_core::store::{self, DatabasePaths, DatabaseStore};
    use faceid_core::types::{Descriptor, NormalizationPolicy};
    use tempfile::TempDir;

    fn populated(dir: &TempDir) -> DatabasePaths {
        let paths = DatabasePaths::in_dir(dir.path());
        let mut db = FaceDatabase::open(DatabaseStore::new(paths.clone(), NormalizationPolicy::Raw)).unwrap();
        db.register(&Descriptor::new(vec![1.0, 2.0, 3.0])).unwrap();
        db.register(&Descriptor::new(vec![4.0, 5.0, 6.0])).unwrap();
        paths
    }

    #[test]
    fn test_report_consistent_pair() {
        let dir = TempDir::new().unwrap();
        let paths = populated(&dir);
        let inspection = store::inspect(&paths).unwrap();
        let report = Report::build(&inspection, ReportOptions { show_vectors: true, dims: 2 });

        assert_eq!(report.vector_count, 2);
        assert_eq!(report.label_count, 2);
        assert_eq!(report.dimension, Some(3));
        assert_eq!(report.policy.as_deref(), Some("raw"));
        assert!(report.warnings.is_empty());
        assert_eq!(report.entries.len(), 2);
        assert_eq!(report.entries[1].vector, Some(vec![4.0, 5.0]));
        assert!(report.entries[0].label.as_deref().unwrap().starts_with("face_1_"));

        let text = report.render_text();
        assert!(text.contains("vectors:      2"));
        assert!(!text.contains("WARNING"));
    }

    #[test]
    fn test_report_flags_missing_labels() {
        let dir = TempDir::new().unwrap();
        let paths = populated(&dir);
        std::fs::remove_file(&paths.labels).unwrap();

        let inspection = store::inspect(&paths).unwrap();
        let report = Report::build(&inspection, ReportOptions { show_vectors: true, dims: 8 });
        assert!(!report.labels_present);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.entries[0].label, None);
        assert_eq!(report.entries[1].vector, Some(vec![4.0, 5.0, 6.0]));
        assert!(report.render_text().contains("<no label>"));
    }

    #[test]
    fn test_report_json_omits_entries_unless_requested() {
        let dir = TempDir::new().unwrap();
        let paths = populated(&dir);
        let inspection = store::inspect(&paths).unwrap();
        let report = Report::build(&inspection, ReportOptions { show_vectors: false, dims: 8 });
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["vector_count"], 2);
        assert!(json.get("entries").is_none());
    }

    #[test]
    fn test_inspect_empty_directory() {
        let dir = TempDir::new().unwrap();
        let inspection = store::inspect(&DatabasePaths::in_dir(dir.path())).unwrap();
        let report = Report::build(&inspection, ReportOptions { show_vectors: true, dims: 8 });
        assert!(!report.index_present);
        assert_eq!(report.vector_count, 0);
        assert!(report.entries.is_empty());
    }
}
