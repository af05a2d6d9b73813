//! PDF generation: NDA agreements, watermarking, and policy exports.
//!
//! Everything is drawn with the 14 standard fonts, so text is reduced to
//! ASCII by [`charmap`] before it is measured or written.

pub mod charmap;
pub mod fonts;
pub mod layout;
pub mod nda;
pub mod policy;
pub mod watermark;

pub use layout::{BlockStyle, DocumentBuilder, PageLayout, Span};
pub use nda::{template_text, NdaContext, NdaPdfService, NdaReference, NDA_TEMPLATE_VERSION};
pub use policy::{PolicyPdfRenderer, RichNode};
pub use watermark::watermark;

use service_core::error::AppError;

pub(crate) fn pdf_error(err: impl std::fmt::Display) -> AppError {
    AppError::InternalError(anyhow::anyhow!("PDF error: {}", err))
}
