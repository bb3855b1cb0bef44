pub mod u501_sync_to_sheet;
