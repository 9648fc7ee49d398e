//! Domain models for the code registry.

pub mod code;
pub mod export;

pub use code::{
    BulkDeleteCodesRequest, Code, CodeFilter, CodeRecord, CodeStats, CodeValidation,
    GenerateCodesRequest, InvalidReason, ListCodesQuery, NewCode, RedeemCodeRequest, Redemption,
    SortOrder, ValidateCodeRequest, ValidationMessages,
};
pub use export::{CodeExport, ExportError, ExportField, ExportFormat, ExportQuery};
