use std::sync::Arc;

use tracing::{debug, info};

use super::{image::PrescriptionImage, vision::VisionService};
use crate::errors::Error;

pub const MEDICINE_INSTRUCTION: &str = "Read the medicine names on this prescription, handwritten \
or printed. Correct spelling mistakes so that each name is an existing medicine. Answer with the \
corrected names only, as a single comma-separated list.";

/// Reads candidate medicine names off a prescription image
pub struct ImageExtractor {
    vision: Arc<dyn VisionService>,
    instruction: String,
}

impl ImageExtractor {
    pub fn new(vision: Arc<dyn VisionService>) -> Self {
        Self {
            vision,
            instruction: MEDICINE_INSTRUCTION.to_string(),
        }
    }

    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = instruction.into();
        self
    }

    pub fn instruction(&self) -> &str {
        &self.instruction
    }

    /// Unstructured model output; may be empty or malformed
    pub async fn extract(&self, image: &PrescriptionImage) -> Result<String, Error> {
        info!(
            vision = self.vision.name(),
            mime_type = image.mime_type(),
            bytes = image.len(),
            "Extracting medicine names"
        );

        let text = self.vision.describe(image, &self.instruction).await?;

        debug!(extracted = %text, "Vision service responded");
        Ok(text)
    }
}
