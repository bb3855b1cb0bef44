pub mod progress;

pub use progress::{MergeOutcome, RowOutcome, RowStatus, SyncError, SyncReport, SyncStatus};

use crate::usecases::common::UseCaseMetadata;

pub struct SyncToSheet;

impl UseCaseMetadata for SyncToSheet {
    fn usecase_index() -> &'static str {
        "u501"
    }

    fn usecase_name() -> &'static str {
        "sync_to_sheet"
    }

    fn display_name() -> &'static str {
        "Load data into Google Sheet"
    }

    fn description() -> &'static str {
        "Transcribes the qualifying rows of an uploaded workbook into the target spreadsheet"
    }
}
