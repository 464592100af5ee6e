use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize};
use solfeo_notify::service::InboxOptions;
use utoipa::IntoParams;
use utoipa::ToSchema;

#[derive(Debug, Clone, Default, Serialize, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct PaginationParams {
    /// Page size (default 20)
    #[param(required = false)]
    #[serde(default, deserialize_with = "deserialize_optional_u64")]
    pub limit: Option<u64>,
    /// Offset (default 0)
    #[param(required = false)]
    #[serde(default, deserialize_with = "deserialize_optional_u64")]
    pub offset: Option<u64>,
}

/// Query of a student's inbox. `limit` defaults to 50 and is capped at 200.
#[derive(Debug, Clone, Default, Serialize, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct InboxParams {
    /// Only messages without a read receipt
    #[param(required = false)]
    #[serde(default, deserialize_with = "deserialize_optional_bool")]
    pub unread_only: Option<bool>,
    #[param(required = false)]
    #[serde(default, deserialize_with = "deserialize_optional_u64")]
    pub limit: Option<u64>,
    #[param(required = false)]
    #[serde(default, deserialize_with = "deserialize_optional_u64")]
    pub skip: Option<u64>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum U64Input {
    Number(u64),
    Text(String),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BoolInput {
    Bool(bool),
    Text(String),
}

fn deserialize_optional_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<U64Input>::deserialize(deserializer)?;
    match value {
        None => Ok(None),
        Some(U64Input::Number(number)) => Ok(Some(number)),
        Some(U64Input::Text(text)) => text
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(DeError::custom),
    }
}

fn deserialize_optional_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<BoolInput>::deserialize(deserializer)?;
    match value {
        None => Ok(None),
        Some(BoolInput::Bool(b)) => Ok(Some(b)),
        Some(BoolInput::Text(text)) => match text.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Ok(Some(true)),
            "false" | "0" | "" => Ok(Some(false)),
            other => Err(DeError::custom(format!("invalid boolean '{other}'"))),
        },
    }
}

const MAX_PAGE_LIMIT: u64 = 1000;

impl PaginationParams {
    pub fn limit(&self) -> usize {
        self.limit.unwrap_or(20).min(MAX_PAGE_LIMIT) as usize
    }

    pub fn offset(&self) -> usize {
        self.offset.unwrap_or(0) as usize
    }
}

impl InboxParams {
    pub fn options(&self) -> InboxOptions {
        InboxOptions {
            unread_only: self.unread_only.unwrap_or(false),
            limit: self.limit.map(|l| l as usize),
            skip: self.skip.map(|s| s as usize),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_numbers_are_accepted() {
        let p: PaginationParams = serde_json::from_str(r#"{"limit":" 5 ","offset":10}"#).unwrap();
        assert_eq!(p.limit(), 5);
        assert_eq!(p.offset(), 10);
        let p: PaginationParams = serde_json::from_str("{}").unwrap();
        assert_eq!(p.limit(), 20);
        assert_eq!(p.offset(), 0);
        let p: PaginationParams = serde_json::from_str(r#"{"limit":5000}"#).unwrap();
        assert_eq!(p.limit(), 1000);
    }

    #[test]
    fn inbox_flags_parse_from_text() {
        let p: InboxParams = serde_json::from_str(r#"{"unread_only":"true","skip":"2"}"#).unwrap();
        let opts = p.options();
        assert!(opts.unread_only);
        assert_eq!(opts.skip, Some(2));
        assert_eq!(opts.limit, None);
        assert!(serde_json::from_str::<InboxParams>(r#"{"unread_only":"maybe"}"#).is_err());
    }
}
