use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

/// Image payload ready to inline into a provider request.
#[derive(Clone, PartialEq, Eq)]
pub struct EncodedImage {
    mime_type: String,
    bytes: Vec<u8>,
}

impl EncodedImage {
    pub fn new(mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            bytes,
        }
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.bytes)
    }

    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.to_base64())
    }
}

// Image bytes are never worth printing.
impl fmt::Debug for EncodedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodedImage")
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    #[error("a question needs either prompt text or an image")]
    EmptyRequest,
    #[error("a subject must be selected before asking")]
    MissingSubject,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudyRequest {
    subject_label: String,
    prompt_text: String,
    image: Option<EncodedImage>,
}

impl StudyRequest {
    pub fn subject_label(&self) -> &str {
        &self.subject_label
    }

    pub fn prompt_text(&self) -> &str {
        &self.prompt_text
    }

    pub fn image(&self) -> Option<&EncodedImage> {
        self.image.as_ref()
    }

    /// The single natural-language line sent ahead of any image part.
    pub fn instruction_text(&self) -> String {
        if self.prompt_text.is_empty() {
            return format!("Subject: {}.", self.subject_label);
        }
        format!(
            "Subject: {}. Request: {}",
            self.subject_label, self.prompt_text
        )
    }
}

/// Combines the inputs into a request, refusing drafts with nothing to ask.
pub fn build(
    subject_label: &str,
    prompt_text: &str,
    image: Option<EncodedImage>,
) -> Result<StudyRequest, RequestError> {
    let subject_label = subject_label.trim();
    if subject_label.is_empty() {
        return Err(RequestError::MissingSubject);
    }
    let prompt_text = prompt_text.trim();
    let image = image.filter(|image| !image.is_empty());
    if prompt_text.is_empty() && image.is_none() {
        return Err(RequestError::EmptyRequest);
    }
    Ok(StudyRequest {
        subject_label: subject_label.to_string(),
        prompt_text: prompt_text.to_string(),
        image,
    })
}

#[cfg(test)]
mod tests {
    use super::{build, EncodedImage, RequestError};

    fn png() -> EncodedImage {
        EncodedImage::new("image/png", vec![0x89, b'P', b'N', b'G'])
    }

    #[test]
    fn text_only_request_builds_instruction_line() {
        let request = build("Math", "2+2=?", None).unwrap();
        assert_eq!(request.instruction_text(), "Subject: Math. Request: 2+2=?");
        assert!(request.image().is_none());
    }

    #[test]
    fn image_only_request_does_not_invent_a_prompt() {
        let request = build("Physics", "   ", Some(png())).unwrap();
        assert_eq!(request.prompt_text(), "");
        assert_eq!(request.instruction_text(), "Subject: Physics.");
        assert_eq!(request.image().map(EncodedImage::mime_type), Some("image/png"));
    }

    #[test]
    fn empty_draft_is_rejected() {
        assert_eq!(build("Math", "", None), Err(RequestError::EmptyRequest));
        assert_eq!(build("Math", " \n\t", None), Err(RequestError::EmptyRequest));
        assert_eq!(
            build("Math", "", Some(EncodedImage::new("image/png", Vec::new()))),
            Err(RequestError::EmptyRequest)
        );
    }

    #[test]
    fn blank_subject_is_rejected() {
        assert_eq!(build(" ", "2+2=?", None), Err(RequestError::MissingSubject));
    }

    #[test]
    fn data_url_and_debug_output() {
        let image = png();
        assert_eq!(image.data_url(), "data:image/png;base64,iVBORw==");
        assert_eq!(
            format!("{image:?}"),
            "EncodedImage { mime_type: \"image/png\", len: 4 }"
        );
    }
}
