pub mod csv;
pub mod recommend;
pub mod recurring;
pub mod rules;
pub mod transfers;
pub(crate) mod util;

pub use csv::{
    export_csv, external_id, import_csv, CsvColumnMapping, CsvError, CsvExportRow,
    CsvImportProfile, CsvImporter,
};
pub use recommend::{recommend, Recommendation, DEFAULT_RECOMMENDATION_LIMIT};
pub use recurring::{RecurringConfig, SubscriptionDetector, SubscriptionSuggestion};
pub use rules::CategoryRuleEngine;
pub use transfers::{
    TransferConfidence, TransferDetector, TransferPair, DEFAULT_TRANSFER_WINDOW_DAYS,
};
pub use util::merchant_key;
