//! Data structures shared by the consolidation and modeling stages.

mod droplet;
pub mod schema;
mod summary;
mod table;

pub use droplet::{DropletRecord, ShapeDescriptors, SpecimenTable};
pub use summary::{SpecimenSummary, SummaryTable};
pub use table::{
    ensure_dir, file_name_sort_key, list_csv_files, prepare_output_file, Table, Value, MISSING,
};
