/// Validated prescription uploads
pub mod image;

/// Vision-language service clients
pub mod vision;

/// ImageExtractor
pub mod extractor;

pub use extractor::{ImageExtractor, MEDICINE_INSTRUCTION};
pub use image::{mime_type_from_file_name, normalize_mime_type, PrescriptionImage, ALLOWED_MIME_TYPES};
pub use vision::{GeminiVision, OpenAiVision, VisionService};
