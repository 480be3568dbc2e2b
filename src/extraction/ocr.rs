use anyhow::Result;
use image::RgbaImage;

/// Reads the text on a frame. Called from blocking workers only.
pub trait TextRecognizer: Send + Sync {
    fn recognize(&self, image: &RgbaImage) -> Result<String>;
}

#[cfg(feature = "native")]
pub use native::UniOcrRecognizer;

#[cfg(feature = "native")]
mod native {
    use anyhow::{anyhow, Context, Result};
    use image::{DynamicImage, RgbaImage};
    use uni_ocr::{OcrEngine, OcrProvider};

    use super::TextRecognizer;

    /// Platform OCR (Vision, Windows.Media.Ocr or Tesseract) through `uni-ocr`.
    #[derive(Debug, Default)]
    pub struct UniOcrRecognizer;

    impl UniOcrRecognizer {
        pub fn new() -> Self {
            Self
        }
    }

    impl TextRecognizer for UniOcrRecognizer {
        fn recognize(&self, image: &RgbaImage) -> Result<String> {
            let engine = OcrEngine::new(OcrProvider::Auto)
                .map_err(|e| anyhow!("failed to create OCR engine: {e}"))?;
            let frame = DynamicImage::ImageRgba8(image.clone());

            // The engine is async; blocking workers may drive it on the
            // ambient runtime, anything else gets a throwaway one.
            let recognized = match tokio::runtime::Handle::try_current() {
                Ok(handle) => handle.block_on(engine.recognize_image(&frame)),
                Err(_) => tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .context("failed to build OCR runtime")?
                    .block_on(engine.recognize_image(&frame)),
            };

            let (text, _language, _confidence) =
                recognized.map_err(|e| anyhow!("OCR failed: {e}"))?;
            Ok(text)
        }
    }
}
