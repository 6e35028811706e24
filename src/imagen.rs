/*
 * Pictor - Sandboxed Filesystem & Image Generation Tool Server
 * File Path: src/imagen.rs
 * Responsibility: Gemini image-generation API call and response decoding.
 */

use base64::{engine::general_purpose, Engine as _};
use once_cell::sync::Lazy;
use serde_json::json;

static POOLED_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .user_agent("pictor/0.1")
        .build()
        .expect("Failed to create pooled reqwest client")
});

#[derive(Debug, Clone)]
pub struct GeneratedImage {
    pub data: Vec<u8>,
    pub mime_type: String,
}

impl GeneratedImage {
    /// File extension derived from the reported mime type.
    pub fn extension(&self) -> &'static str {
        match self.mime_type.as_str() {
            "image/jpeg" => "jpg",
            "image/webp" => "webp",
            _ => "png",
        }
    }
}

/// Ask Gemini for one image. The first `inlineData` part wins; a response
/// with no image part is an upstream failure reported with its finish reason.
pub async fn generate_image(
    prompt: &str,
    api_key: &str,
    model: &str,
) -> anyhow::Result<GeneratedImage> {
    if api_key.is_empty() {
        return Err(anyhow::anyhow!(
            "No Gemini API key configured. Set gemini.api_key or GEMINI_API_KEY."
        ));
    }

    let url = format!(
        "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
        model, api_key
    );

    let payload = json!({
        "contents": [{
            "role": "user",
            "parts": [{ "text": prompt }]
        }],
        "generationConfig": {
            "responseModalities": ["TEXT", "IMAGE"]
        }
    });

    let response = POOLED_CLIENT.post(url).json(&payload).send().await?;

    if !response.status().is_success() {
        let error_text = response.text().await?;
        return Err(anyhow::anyhow!(
            "Gemini API Error (Model: {}): {}",
            model,
            error_text
        ));
    }

    let res_json: serde_json::Value = response.json().await?;
    let parts = &res_json["candidates"][0]["content"]["parts"];

    if let Some(parts) = parts.as_array() {
        for part in parts {
            let Some(inline) = part.get("inlineData") else {
                continue;
            };
            let Some(encoded) = inline["data"].as_str() else {
                continue;
            };
            let data = general_purpose::STANDARD.decode(encoded)?;
            let mime_type = inline["mimeType"].as_str().unwrap_or("image/png").to_string();
            return Ok(GeneratedImage { data, mime_type });
        }
    }

    let reason = res_json["candidates"][0]["finishReason"]
        .as_str()
        .unwrap_or("UNKNOWN");
    let msg = if reason == "SAFETY" {
        "Gemini blocked the image due to SAFETY filters. Rework the prompt.".to_string()
    } else {
        format!("Gemini returned no image data. Finish Reason: {}", reason)
    };
    eprintln!("🔴 [IMAGEN ERROR] {}", msg);
    Err(anyhow::anyhow!(msg))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_tracks_mime_type() {
        let png = GeneratedImage {
            data: vec![],
            mime_type: "image/png".to_string(),
        };
        let jpg = GeneratedImage {
            data: vec![],
            mime_type: "image/jpeg".to_string(),
        };
        let unknown = GeneratedImage {
            data: vec![],
            mime_type: "application/octet-stream".to_string(),
        };
        assert_eq!(png.extension(), "png");
        assert_eq!(jpg.extension(), "jpg");
        assert_eq!(unknown.extension(), "png");
    }

    #[tokio::test]
    async fn test_generate_image_requires_an_api_key() {
        let err = generate_image("a red square", "", "test-model")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("API key"));
    }
}
