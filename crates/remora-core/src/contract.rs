//! Service contracts: the method signatures a service exposes to callers.

use crate::{RemotingError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;

/// Declared type of a parameter or return value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "of", rename_all = "snake_case")]
pub enum ValueType {
    Unit,
    Bool,
    Int,
    Float,
    String,
    List(Box<ValueType>),
    /// A named record, encoded as a JSON object.
    Object(String),
    Optional(Box<ValueType>),
    Any,
}

impl ValueType {
    pub fn list(inner: ValueType) -> Self {
        ValueType::List(Box::new(inner))
    }

    pub fn object(name: impl Into<String>) -> Self {
        ValueType::Object(name.into())
    }

    pub fn optional(inner: ValueType) -> Self {
        ValueType::Optional(Box::new(inner))
    }

    /// Check an encoded value against this type.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            ValueType::Unit => value.is_null(),
            ValueType::Bool => value.is_boolean(),
            ValueType::Int => value.is_i64() || value.is_u64(),
            ValueType::Float => value.is_number(),
            ValueType::String => value.is_string(),
            ValueType::List(inner) => value
                .as_array()
                .map(|items| items.iter().all(|item| inner.matches(item)))
                .unwrap_or(false),
            ValueType::Object(_) => value.is_object(),
            ValueType::Optional(inner) => value.is_null() || inner.matches(value),
            ValueType::Any => true,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Unit => write!(f, "Unit"),
            ValueType::Bool => write!(f, "Bool"),
            ValueType::Int => write!(f, "Int"),
            ValueType::Float => write!(f, "Float"),
            ValueType::String => write!(f, "String"),
            ValueType::List(inner) => write!(f, "List<{}>", inner),
            ValueType::Object(name) => write!(f, "{}", name),
            ValueType::Optional(inner) => write!(f, "Option<{}>", inner),
            ValueType::Any => write!(f, "Any"),
        }
    }
}

/// Short JSON type name for mismatch messages.
fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ValueType,
}

/// One method of a service contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodSignature {
    pub name: String,
    pub params: Vec<Param>,
    pub returns: ValueType,
}

impl MethodSignature {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            returns: ValueType::Unit,
        }
    }

    pub fn param(mut self, name: impl Into<String>, ty: ValueType) -> Self {
        self.params.push(Param {
            name: name.into(),
            ty,
        });
        self
    }

    pub fn returns(mut self, ty: ValueType) -> Self {
        self.returns = ty;
        self
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Check call arguments against the declared parameters.
    pub fn check_args(&self, args: &[Value]) -> Result<()> {
        if args.len() != self.params.len() {
            return Err(RemotingError::ArgumentMismatch {
                method: self.name.clone(),
                message: format!(
                    "expected {} argument(s), got {}",
                    self.params.len(),
                    args.len()
                ),
            });
        }

        for (index, (param, arg)) in self.params.iter().zip(args).enumerate() {
            if !param.ty.matches(arg) {
                return Err(RemotingError::ArgumentMismatch {
                    method: self.name.clone(),
                    message: format!(
                        "argument {} ({}) expected {}, got {}",
                        index,
                        param.name,
                        param.ty,
                        describe(arg)
                    ),
                });
            }
        }

        Ok(())
    }
}

impl fmt::Display for MethodSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params: Vec<String> = self
            .params
            .iter()
            .map(|p| format!("{}: {}", p.name, p.ty))
            .collect();
        write!(f, "{}({}) -> {}", self.name, params.join(", "), self.returns)
    }
}

/// Named, versioned contract a service exposes to remote callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    name: String,
    version: String,
    methods: Vec<MethodSignature>,
}

impl ServiceDescriptor {
    pub fn builder(name: impl Into<String>) -> ServiceDescriptorBuilder {
        ServiceDescriptorBuilder {
            name: name.into(),
            version: "1.0".to_string(),
            methods: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Methods in declaration order.
    pub fn methods(&self) -> &[MethodSignature] {
        &self.methods
    }

    pub fn method(&self, name: &str) -> Option<&MethodSignature> {
        self.methods.iter().find(|m| m.name == name)
    }
}

pub struct ServiceDescriptorBuilder {
    name: String,
    version: String,
    methods: Vec<MethodSignature>,
}

impl ServiceDescriptorBuilder {
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn method(mut self, signature: MethodSignature) -> Self {
        self.methods.push(signature);
        self
    }

    /// Finish the descriptor.
    ///
    /// Fails with `InvalidDescriptor` for an empty service name or a method
    /// name declared twice.
    pub fn build(self) -> Result<ServiceDescriptor> {
        if self.name.trim().is_empty() {
            return Err(RemotingError::InvalidDescriptor {
                service: self.name,
                message: "service name must not be empty".to_string(),
            });
        }

        let mut seen = HashSet::new();
        for method in &self.methods {
            if !seen.insert(method.name.as_str()) {
                return Err(RemotingError::InvalidDescriptor {
                    service: self.name.clone(),
                    message: format!("method {} declared twice", method.name),
                });
            }
        }

        Ok(ServiceDescriptor {
            name: self.name,
            version: self.version,
            methods: self.methods,
        })
    }
}
