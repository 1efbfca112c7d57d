pub mod collections;
pub mod flash_sale;
pub mod report;
pub mod status;
pub mod stock;

pub use flash_sale::NewFlashSale;
pub use report::ReportType;
pub use status::{
    ChallengeStatus, FlashSaleStatus, ReportStatus, ReturnStatus, UnknownVariant, UserStatus,
};
pub use stock::{StockUpdate, StockUpdateOutcome};
