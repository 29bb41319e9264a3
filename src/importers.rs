// ! Spreadsheet acquisition and raw sheet extraction

pub mod downloader;
pub mod workbook_reader;

// Re-export commonly used items
pub use downloader::{SourceFetcher, SpreadsheetSource};
pub use workbook_reader::{PlantWorkbook, ReaderError};
