use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 证件提取字段
///
/// 已知字段对应后端提示词中要求的键；其余键保留在 `extra` 中。
/// 已知键的值不是字符串时不报错，原样移入 `extra`。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Map<String, Value>")]
pub struct ExtractedFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub father_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cnic_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dob: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl From<Map<String, Value>> for ExtractedFields {
    fn from(mut extra: Map<String, Value>) -> Self {
        let mut take = |key: &str| match extra.remove(key) {
            Some(Value::String(s)) => Some(s),
            Some(Value::Null) | None => None,
            Some(other) => {
                extra.insert(key.to_string(), other);
                None
            }
        };

        Self {
            name: take("name"),
            father_name: take("father_name"),
            cnic_number: take("cnic_number"),
            dob: take("dob"),
            gender: take("gender"),
            issue_date: take("issue_date"),
            expiry_date: take("expiry_date"),
            extra,
        }
    }
}

/// 单条提取结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionRecord {
    pub data: ExtractedFields,
}

/// 后端成功响应
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResponse {
    #[serde(default)]
    pub results: Vec<ExtractionRecord>,
}

impl ExtractionResponse {
    pub fn new(results: Vec<ExtractionRecord>) -> Self {
        Self { results }
    }

    /// 只含一条记录的响应
    pub fn single(data: ExtractedFields) -> Self {
        Self {
            results: vec![ExtractionRecord { data }],
        }
    }

    /// 取第一条记录的字段，没有记录时返回 None
    pub fn into_first_record(self) -> Option<ExtractedFields> {
        self.results.into_iter().next().map(|r| r.data)
    }
}
