use serde::Deserialize;
use serde_json::Value;
use std::fmt;

/// Lifecycle event a request asks the server to handle.
///
/// Matching is case-insensitive; anything unrecognized is kept verbatim so it
/// can be echoed back in the failure reason.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum RequestType {
    Create,
    Update,
    Delete,
    Unknown(String),
}

impl RequestType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Create => "Create",
            Self::Update => "Update",
            Self::Delete => "Delete",
            Self::Unknown(raw) => raw,
        }
    }
}

impl From<String> for RequestType {
    fn from(raw: String) -> Self {
        if raw.eq_ignore_ascii_case("create") {
            Self::Create
        } else if raw.eq_ignore_ascii_case("update") {
            Self::Update
        } else if raw.eq_ignore_ascii_case("delete") {
            Self::Delete
        } else {
            Self::Unknown(raw)
        }
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResourceProperties {
    /// Empty when the caller did not send one. Only `Create` and `Update`
    /// need it.
    #[serde(default, alias = "TableName")]
    pub table: String,
}

/// A custom-resource style lifecycle request.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LifecycleRequest {
    pub request_type: RequestType,
    #[serde(rename = "ResponseURL")]
    pub response_url: String,
    pub stack_id: String,
    pub request_id: String,
    pub logical_resource_id: String,
    #[serde(default)]
    pub physical_resource_id: Option<String>,
    #[serde(default)]
    pub resource_properties: ResourceProperties,
}

impl LifecycleRequest {
    pub fn table(&self) -> &str {
        &self.resource_properties.table
    }

    /// Recovers enough of a body that failed to parse to report the failure
    /// back to its `ResponseURL`. Returns `None` when there is no URL to
    /// report to.
    pub fn salvage(body: &Value) -> Option<Self> {
        let field = |pointer: &str| {
            body.pointer(pointer)
                .and_then(Value::as_str)
                .map(str::to_string)
        };
        let response_url = field("/ResponseURL").filter(|url| !url.is_empty())?;

        Some(Self {
            request_type: RequestType::from(field("/RequestType").unwrap_or_default()),
            response_url,
            stack_id: field("/StackId").unwrap_or_default(),
            request_id: field("/RequestId").unwrap_or_default(),
            logical_resource_id: field("/LogicalResourceId").unwrap_or_default(),
            physical_resource_id: field("/PhysicalResourceId"),
            resource_properties: ResourceProperties {
                table: field("/ResourceProperties/Table")
                    .or_else(|| field("/ResourceProperties/TableName"))
                    .unwrap_or_default(),
            },
        })
    }

    /// Identifier reported back to the caller. Falls back to the table name
    /// on `Create`, when the caller has not assigned one yet.
    pub fn physical_resource_id(&self) -> &str {
        self.physical_resource_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| self.table())
    }
}
