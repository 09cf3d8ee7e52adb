use std::time::Duration;

use async_trait::async_trait;
use base64ct::{Base64, Encoding};
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use super::{sniff_mime, RawEstimate, RecognitionError, RecognitionProvider};

const SYSTEM_PROMPT: &str = "You are a nutrition assistant. You look at photos of food and \
estimate what the dish is, how large the portion is and how many kilocalories it contains. \
Be concise, practical and encouraging.";

const USER_INSTRUCTION: &str = "Analyse the food in the image and give a short estimate. \
Reply strictly with a JSON object with the keys: dish (string), portion (string), \
calories_kcal (number), health_score (number from 1 to 5), recommendation (string), \
motivation (string), low_quality (boolean, true when the photo is too dark, blurry or shows no food). \
No comments.";

/// Vision provider speaking the OpenAI chat-completions protocol.
pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiProvider {
    pub fn new(
        api_key: String,
        model: String,
        base_url: String,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_key,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[derive(Deserialize)]
struct ChatCompletion {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[async_trait]
impl RecognitionProvider for OpenAiProvider {
    async fn recognize(&self, image: &[u8]) -> Result<RawEstimate, RecognitionError> {
        let mime = sniff_mime(image).ok_or_else(|| {
            RecognitionError::InvalidImage("empty or unsupported image format".into())
        })?;
        let data_url = format!("data:{mime};base64,{}", Base64::encode_string(image));

        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                {
                    "role": "user",
                    "content": [
                        { "type": "text", "text": USER_INSTRUCTION },
                        { "type": "image_url", "image_url": { "url": data_url, "detail": "auto" } }
                    ]
                }
            ],
            "temperature": 0.2,
            "max_tokens": 400
        });

        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(classify_request_error)?;

        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".into());
            return Err(classify_status(status, &text));
        }

        // Reading the body can still fail on the wire; only a body that
        // arrived in full and does not parse is malformed.
        let body = response
            .bytes()
            .await
            .map_err(|e| RecognitionError::Transient(format!("reading response body: {e}")))?;
        let completion: ChatCompletion = serde_json::from_slice(&body).map_err(|e| {
            warn!(error = %e, body = %preview(&String::from_utf8_lossy(&body)), "completion is not valid JSON");
            RecognitionError::MalformedResponse(e.to_string())
        })?;
        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| RecognitionError::MalformedResponse("completion has no content".into()))?;

        debug!(model = %self.model, "vision completion received");
        parse_estimate(&content)
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

fn classify_request_error(e: reqwest::Error) -> RecognitionError {
    if e.is_builder() {
        RecognitionError::Rejected(e.to_string())
    } else {
        RecognitionError::Transient(e.to_string())
    }
}

fn classify_status(status: StatusCode, body: &str) -> RecognitionError {
    let detail = format!("{status}: {}", preview(body));
    match status.as_u16() {
        429 | 500 | 502 | 503 | 504 => RecognitionError::Transient(detail),
        413 | 415 | 422 => RecognitionError::InvalidImage(detail),
        // 400 also covers unknown models and bad parameters.
        400 if body.to_ascii_lowercase().contains("image") => RecognitionError::InvalidImage(detail),
        _ => RecognitionError::Rejected(detail),
    }
}

/// Parses the model's reply into a [`RawEstimate`].
pub(crate) fn parse_estimate(content: &str) -> Result<RawEstimate, RecognitionError> {
    let value: Value = serde_json::from_str(strip_code_fences(content)).map_err(|e| {
        warn!(error = %e, reply = %preview(content), "provider reply is not JSON");
        RecognitionError::MalformedResponse(e.to_string())
    })?;
    let Value::Object(map) = value else {
        warn!(reply = %preview(content), "provider reply is not a JSON object");
        return Err(RecognitionError::MalformedResponse(
            "expected a JSON object".into(),
        ));
    };

    if map
        .get("low_quality")
        .and_then(Value::as_bool)
        .unwrap_or(false)
    {
        return Err(RecognitionError::InvalidImage(
            "photo is too poor to recognise the meal".into(),
        ));
    }

    Ok(RawEstimate {
        dish_name: text_field(&map, "dish").unwrap_or_default(),
        calories: number_field(&map, "calories_kcal"),
        confidence: number_field(&map, "confidence"),
        portion: text_field(&map, "portion"),
        health_score: number_field(&map, "health_score"),
        recommendation: text_field(&map, "recommendation"),
        motivation: text_field(&map, "motivation"),
        raw_json: Some(Value::Object(map)),
    })
}

fn strip_code_fences(text: &str) -> &str {
    lazy_static! {
        static ref FENCED: Regex = Regex::new(r"(?s)^```[A-Za-z0-9_-]*[ \t]*\n(.*?)\n?```$").unwrap();
    }
    let trimmed = text.trim();
    FENCED
        .captures(trimmed)
        .and_then(|c| c.get(1))
        .map_or(trimmed, |m| m.as_str().trim())
}

fn text_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    map.get(key).and_then(Value::as_str).map(str::to_string)
}

fn number_field(map: &Map<String, Value>, key: &str) -> Option<f64> {
    match map.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn preview(text: &str) -> String {
    text.chars().take(200).collect()
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    #[test]
    fn strips_markdown_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fences("  ```\n{}\n```  "), "{}");
        assert_eq!(strip_code_fences("{\"plain\": true}"), "{\"plain\": true}");
    }

    #[test]
    fn parses_a_full_reply() {
        let reply = r#"```json
{"dish": "Caesar salad", "portion": "1 bowl, ~250 g", "calories_kcal": 412.6,
 "health_score": 4, "recommendation": "Add some wholegrain bread", "motivation": "Nice choice!",
 "low_quality": false}
```"#;
        let est = parse_estimate(reply).unwrap();
        assert_eq!(est.dish_name, "Caesar salad");
        assert_eq!(est.portion.as_deref(), Some("1 bowl, ~250 g"));
        assert_eq!(est.calories, Some(412.6));
        assert_eq!(est.health_score, Some(4.0));
        assert_eq!(est.recommendation.as_deref(), Some("Add some wholegrain bread"));
        assert_eq!(est.motivation.as_deref(), Some("Nice choice!"));
        assert_eq!(est.confidence, None);
    }

    #[test]
    fn numeric_strings_are_accepted_and_junk_is_dropped() {
        let est = parse_estimate(r#"{"dish": "pie", "calories_kcal": " 350 "}"#).unwrap();
        assert_eq!(est.calories, Some(350.0));

        let est = parse_estimate(r#"{"dish": "pie", "calories_kcal": "a lot"}"#).unwrap();
        assert_eq!(est.calories, None);

        let est = parse_estimate(r#"{"calories_kcal": null}"#).unwrap();
        assert_eq!(est.dish_name, "");
        assert_eq!(est.calories, None);
    }

    #[test]
    fn low_quality_photo_is_an_invalid_image() {
        let err = parse_estimate(r#"{"dish": "?", "low_quality": true}"#).unwrap_err();
        assert!(matches!(err, RecognitionError::InvalidImage(_)));
    }

    #[test]
    fn non_object_replies_are_malformed() {
        for reply in ["I cannot see any food here.", "[1, 2, 3]", "", "```json\n{broken\n```"] {
            let err = parse_estimate(reply).unwrap_err();
            assert!(
                matches!(err, RecognitionError::MalformedResponse(_)),
                "reply {reply:?} gave {err:?}"
            );
        }
    }

    #[test]
    fn status_codes_map_to_failure_kinds() {
        assert!(classify_status(StatusCode::TOO_MANY_REQUESTS, "slow down").is_transient());
        assert!(classify_status(StatusCode::BAD_GATEWAY, "").is_transient());
        assert!(matches!(
            classify_status(StatusCode::BAD_REQUEST, "invalid image_url"),
            RecognitionError::InvalidImage(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_REQUEST, r#"{"error":{"code":"model_not_found"}}"#),
            RecognitionError::Rejected(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED, "bad key"),
            RecognitionError::Rejected(_)
        ));
    }

    const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];

    /// Answers a single request with `response` and hangs up.
    async fn serve_once(response: Vec<u8>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            while !request_complete(&request) {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            socket.write_all(&response).await.unwrap();
            socket.shutdown().await.ok();
        });
        format!("http://{addr}/v1")
    }

    fn request_complete(request: &[u8]) -> bool {
        let text = String::from_utf8_lossy(request);
        let Some(head_end) = text.find("\r\n\r\n") else {
            return false;
        };
        let length = text[..head_end]
            .lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        request.len() >= head_end + 4 + length
    }

    fn http_ok(body: &str, declared_len: usize) -> Vec<u8> {
        format!(
            "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {declared_len}\r\nconnection: close\r\n\r\n{body}"
        )
        .into_bytes()
    }

    fn provider(base_url: String) -> OpenAiProvider {
        OpenAiProvider::new("sk-test".into(), "gpt-4o-mini".into(), base_url, Duration::from_secs(5))
            .unwrap()
    }

    #[tokio::test]
    async fn completion_reply_is_parsed_and_kept_raw() {
        let content = r#"{\"dish\":\"soup\",\"calories_kcal\":300,\"ingredients\":[\"beet\"]}"#;
        let body = format!(r#"{{"choices":[{{"message":{{"content":"{content}"}}}}]}}"#);
        let url = serve_once(http_ok(&body, body.len())).await;

        let est = provider(url).recognize(JPEG).await.unwrap();
        assert_eq!(est.dish_name, "soup");
        assert_eq!(est.calories, Some(300.0));
        let raw = est.raw_json.unwrap();
        assert_eq!(raw["calories_kcal"], 300);
        assert_eq!(raw["ingredients"][0], "beet");
    }

    #[tokio::test]
    async fn body_cut_off_mid_transfer_is_transient() {
        let url = serve_once(http_ok(r#"{"choices": ["#, 500)).await;
        let err = provider(url).recognize(JPEG).await.unwrap_err();
        assert!(err.is_transient(), "got {err:?}");
    }

    #[tokio::test]
    async fn complete_but_unparseable_body_is_malformed() {
        let url = serve_once(http_ok("not json", 8)).await;
        let err = provider(url).recognize(JPEG).await.unwrap_err();
        assert!(matches!(err, RecognitionError::MalformedResponse(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn unsupported_bytes_fail_before_any_request() {
        let provider = OpenAiProvider::new(
            "sk-test".into(),
            "gpt-4o-mini".into(),
            "http://127.0.0.1:9/v1/".into(),
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(provider.base_url, "http://127.0.0.1:9/v1");
        let err = provider.recognize(b"not an image").await.unwrap_err();
        assert!(matches!(err, RecognitionError::InvalidImage(_)));
    }
}
