use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};

use crate::error::ProtocolError;

pub const PROTOCOL_VERSION: &str = "1.1";

pub type RequestId = u64;

/// A call or, when `id` is `None`, a notification that must not be answered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: Option<RequestId>,
    pub method: String,
    #[serde(default)]
    pub args: Vec<Value>,
    #[serde(default)]
    pub kwargs: Map<String, Value>,
}

impl Request {
    pub fn call(id: RequestId, method: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            id: Some(id),
            method: method.into(),
            args,
            kwargs: Map::new(),
        }
    }

    pub fn notification(method: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            id: None,
            method: method.into(),
            args,
            kwargs: Map::new(),
        }
    }

    pub fn with_kwarg(mut self, name: impl Into<String>, value: Value) -> Self {
        self.kwargs.insert(name.into(), value);
        self
    }

    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }

    /// Positional argument `index`, falling back to the keyword argument `name`.
    pub fn arg(&self, index: usize, name: &str) -> Option<&Value> {
        self.args
            .get(index)
            .or_else(|| self.kwargs.get(name))
            .filter(|value| !value.is_null())
    }

    /// Decodes a required argument.
    pub fn param<T: DeserializeOwned>(&self, index: usize, name: &str) -> Result<T, ProtocolError> {
        self.optional_param(index, name)?
            .ok_or_else(|| ProtocolError::invalid_params(&self.method, format!("missing argument `{}`", name)))
    }

    /// Decodes an argument that may be omitted or `null`.
    pub fn optional_param<T: DeserializeOwned>(&self, index: usize, name: &str) -> Result<Option<T>, ProtocolError> {
        self.arg(index, name)
            .map(|value| {
                serde_json::from_value(value.clone())
                    .map_err(|err| ProtocolError::invalid_params(&self.method, format!("`{}`: {}", name, err)))
            })
            .transpose()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(default = "default_version")]
    pub version: String,
    pub id: Option<RequestId>,
    #[serde(default)]
    pub result: Value,
    #[serde(default)]
    pub error: Option<RpcError>,
}

fn default_version() -> String {
    PROTOCOL_VERSION.to_string()
}

impl Response {
    pub fn ok(id: RequestId, result: Value) -> Self {
        Self {
            version: default_version(),
            id: Some(id),
            result,
            error: None,
        }
    }

    pub fn error(id: RequestId, error: RpcError) -> Self {
        Self {
            version: default_version(),
            id: Some(id),
            result: Value::Null,
            error: Some(error),
        }
    }

    pub fn into_result(self) -> Result<Value, RpcError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.result),
        }
    }
}

/// Anything that travels over a transport. Requests are recognised by their
/// `method` key, everything else is a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
    Request(Request),
    Response(Response),
}

impl From<Request> for Message {
    fn from(request: Request) -> Self {
        Message::Request(request)
    }
}

impl From<Response> for Message {
    fn from(response: Response) -> Self {
        Message::Response(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case::call(
        r#"{"id":1,"method":"do_inspect","args":["1+1"]}"#,
        Message::Request(Request::call(1, "do_inspect", vec![json!("1+1")]))
    )]
    #[case::notification(
        r#"{"id":null,"method":"write","args":["hi"],"kwargs":{}}"#,
        Message::Request(Request::notification("write", vec![json!("hi")]))
    )]
    #[case::response(
        r#"{"version":"1.1","id":1,"result":2,"error":null}"#,
        Message::Response(Response::ok(1, json!(2)))
    )]
    #[case::error_response(
        r#"{"id":3,"result":null,"error":{"code":0,"message":"boom"}}"#,
        Message::Response(Response::error(3, RpcError { code: 0, message: "boom".to_string() }))
    )]
    fn test_decode(#[case] input: &str, #[case] expected: Message) {
        assert_eq!(serde_json::from_str::<Message>(input).unwrap(), expected);
    }

    #[test]
    fn test_request_encoding_is_stable() {
        let request = Request::call(7, "do_set_breakpoint", vec![json!("main.qs"), json!(3)])
            .with_kwarg("temporary", json!(1));

        let encoded = serde_json::to_string(&Message::from(request)).unwrap();
        let decoded: Message = serde_json::from_str(&encoded).unwrap();

        assert_eq!(serde_json::to_string(&decoded).unwrap(), encoded);
        assert_eq!(
            encoded,
            r#"{"id":7,"method":"do_set_breakpoint","args":["main.qs",3],"kwargs":{"temporary":1}}"#
        );
    }

    #[test]
    fn test_arg_falls_back_to_kwargs() {
        let request = Request::call(1, "do_set_breakpoint", vec![json!("main.qs"), json!(3), Value::Null])
            .with_kwarg("cond", json!("x > 1"));

        assert_eq!(request.arg(1, "lineno"), Some(&json!(3)));
        assert_eq!(request.arg(2, "temporary"), None);
        assert_eq!(request.arg(3, "cond"), Some(&json!("x > 1")));
    }

    #[test]
    fn test_params() {
        let request = Request::call(1, "do_jump", vec![json!("ten")]);

        assert_eq!(request.optional_param::<u64>(1, "extra").unwrap(), None);
        assert!(matches!(
            request.param::<u64>(0, "lineno"),
            Err(ProtocolError::InvalidParams { ref method, .. }) if method == "do_jump"
        ));
        assert!(request.param::<String>(1, "missing").is_err());
        assert_eq!(request.param::<String>(0, "lineno").unwrap(), "ten");
    }
}
