use std::{collections::HashMap, sync::Arc};

use parking_lot::RwLock;
use rmpv::Value;
use serde::{de::DeserializeOwned, Serialize};

use crate::error::{HandlerError, RegistryError};

/// Arguments of one inbound call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallArgs {
    pub args: Vec<Value>,
    pub kwargs: Vec<(Value, Value)>,
}

impl CallArgs {
    pub fn new(args: Vec<Value>, kwargs: Vec<(Value, Value)>) -> Self {
        Self { args, kwargs }
    }

    pub fn expect_arity(&self, expected: usize) -> Result<(), HandlerError> {
        if self.args.len() == expected {
            Ok(())
        } else {
            Err(HandlerError::ArityMismatch { expected, got: self.args.len() })
        }
    }

    pub fn arg<T: DeserializeOwned>(&self, index: usize) -> Result<T, HandlerError> {
        let value = self.args.get(index).ok_or(HandlerError::MissingArgument(index))?;
        rmpv::ext::from_value(value.clone()).map_err(|e| HandlerError::InvalidArgument(format!("argument {}: {}", index, e)))
    }

    pub fn kwarg<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, HandlerError> {
        match self.kwargs.iter().find(|(key, _)| key.as_str() == Some(name)) {
            Some((_, value)) => rmpv::ext::from_value(value.clone())
                .map(Some)
                .map_err(|e| HandlerError::InvalidArgument(format!("argument {}: {}", name, e))),
            None => Ok(None),
        }
    }

    /// Deserialize all positional arguments at once, usually into a tuple.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, HandlerError> {
        rmpv::ext::from_value(Value::Array(self.args.clone())).map_err(|e| HandlerError::InvalidArgument(e.to_string()))
    }
}

/// Convert a handler result into a wire value.
pub fn reply<T: Serialize>(value: T) -> Result<Value, HandlerError> {
    rmpv::ext::to_value(value).map_err(|e| HandlerError::Failed(format!("unserializable result: {}", e)))
}

/// Function callable by remote peers.
pub trait RpcFunction: Send + Sync {
    fn invoke(&self, args: CallArgs) -> Result<Value, HandlerError>;
}

impl<F> RpcFunction for F
where
    F: Fn(CallArgs) -> Result<Value, HandlerError> + Send + Sync,
{
    fn invoke(&self, args: CallArgs) -> Result<Value, HandlerError> {
        self(args)
    }
}

#[derive(Default)]
pub struct FunctionRegistry {
    functions: RwLock<HashMap<String, Arc<dyn RpcFunction>>>,
}

impl FunctionRegistry {
    /// Install or replace the function registered under `name`.
    pub fn register(&self, name: &str, function: Arc<dyn RpcFunction>) {
        if self.functions.write().insert(name.to_string(), function).is_some() {
            log::info!("[FunctionRegistry] replaced function {}", name);
        } else {
            log::info!("[FunctionRegistry] registered function {}", name);
        }
    }

    pub fn deregister(&self, name: &str) -> Result<Arc<dyn RpcFunction>, RegistryError> {
        self.functions.write().remove(name).ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn RpcFunction>> {
        self.functions.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.read().contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.functions.read().keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rmpv::Value;

    use super::{reply, CallArgs, FunctionRegistry, RpcFunction};
    use crate::error::{HandlerError, RegistryError};

    struct Greeter;

    impl RpcFunction for Greeter {
        fn invoke(&self, args: CallArgs) -> Result<Value, HandlerError> {
            let name: String = args.arg(0)?;
            reply(format!("Hello {}", name))
        }
    }

    fn add(args: CallArgs) -> Result<Value, HandlerError> {
        let (a, b): (i64, i64) = args.parse()?;
        reply(a + b)
    }

    #[test]
    fn should_register_and_invoke() {
        let registry = FunctionRegistry::default();
        registry.register("add", Arc::new(add));
        registry.register("sayhello", Arc::new(Greeter));

        let function = registry.get("add").expect("Should has add");
        assert_eq!(function.invoke(CallArgs::new(vec![Value::from(2), Value::from(3)], vec![])), Ok(Value::from(5)));

        let function = registry.get("sayhello").expect("Should has sayhello");
        assert_eq!(function.invoke(CallArgs::new(vec![Value::from("World")], vec![])), Ok(Value::from("Hello World")));
        assert_eq!(registry.names(), vec!["add".to_string(), "sayhello".to_string()]);
    }

    #[test]
    fn register_should_overwrite() {
        let registry = FunctionRegistry::default();
        registry.register("f", Arc::new(|_args: CallArgs| reply(1)));
        registry.register("f", Arc::new(|_args: CallArgs| reply(2)));
        let function = registry.get("f").expect("Should has f");
        assert_eq!(function.invoke(CallArgs::default()), Ok(Value::from(2)));
    }

    #[test]
    fn deregister_should_remove() {
        let registry = FunctionRegistry::default();
        registry.register("add", Arc::new(add));
        assert!(registry.deregister("add").is_ok());
        assert!(!registry.contains("add"));
        assert!(matches!(registry.deregister("add"), Err(RegistryError::NotFound(name)) if name == "add"));
    }

    #[test]
    fn args_helpers_should_report_mismatch() {
        let args = CallArgs::new(vec![Value::from(1), Value::from("x")], vec![(Value::from("k"), Value::from("KEY"))]);
        assert_eq!(args.arg::<i64>(0), Ok(1));
        assert_eq!(args.arg::<i64>(5), Err(HandlerError::MissingArgument(5)));
        assert!(matches!(args.arg::<i64>(1), Err(HandlerError::InvalidArgument(_))));
        assert_eq!(args.kwarg::<String>("k"), Ok(Some("KEY".to_string())));
        assert_eq!(args.kwarg::<String>("v"), Ok(None));
        assert_eq!(args.expect_arity(2), Ok(()));
        assert_eq!(args.expect_arity(3), Err(HandlerError::ArityMismatch { expected: 3, got: 2 }));
        assert!(matches!(args.parse::<(i64, i64)>(), Err(HandlerError::InvalidArgument(_))));
        assert!(matches!(CallArgs::new(vec![Value::from(1)], vec![]).parse::<(i64, i64)>(), Err(HandlerError::InvalidArgument(_))));
    }
}
