use std::time::Duration;

use rmpv::Value;
use serde::{de::DeserializeOwned, Serialize};

use crate::{engine::RpcEngine, error::RpcError};

/// Client side proxy bound to one destination channel.
#[derive(Clone)]
pub struct Invoker {
    engine: RpcEngine,
    channel: String,
    timeout: Duration,
}

impl Invoker {
    pub(crate) fn new(engine: RpcEngine, channel: &str, timeout: Duration) -> Self {
        Self {
            engine,
            channel: channel.to_string(),
            timeout,
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn call(&self, function: &str, args: Vec<Value>) -> Result<Value, RpcError> {
        self.call_with_kwargs(function, args, vec![]).await
    }

    pub async fn call_with_kwargs(&self, function: &str, args: Vec<Value>, kwargs: Vec<(Value, Value)>) -> Result<Value, RpcError> {
        self.engine.call(&self.channel, function, args, kwargs, self.timeout).await
    }

    /// Typed call. `args` is usually a tuple, each element becoming one positional argument.
    pub async fn call_as<A: Serialize, R: DeserializeOwned>(&self, function: &str, args: A) -> Result<R, RpcError> {
        let args = to_positional(args)?;
        let result = self.call(function, args).await?;
        rmpv::ext::from_value(result).map_err(|e| RpcError::RetvalError(e.to_string()))
    }

    /// Fire-and-forget, no answer will ever come back.
    pub async fn emit(&self, function: &str, args: Vec<Value>, kwargs: Vec<(Value, Value)>) -> Result<(), RpcError> {
        self.engine.emit(&self.channel, function, args, kwargs).await
    }

    /// Blocking variant of [`Invoker::call`], meant for synchronous handlers calling other engines.
    pub fn call_blocking(&self, function: &str, args: Vec<Value>) -> Result<Value, RpcError> {
        async_std::task::block_on(self.call(function, args))
    }
}

fn to_positional<A: Serialize>(args: A) -> Result<Vec<Value>, RpcError> {
    match rmpv::ext::to_value(args) {
        Ok(Value::Array(args)) => Ok(args),
        Ok(Value::Nil) => Ok(vec![]),
        Ok(arg) => Ok(vec![arg]),
        Err(e) => Err(RpcError::InvalidArgument(e.to_string())),
    }
}

/// Declare a typed client for functions served on one channel.
///
/// ```rust,ignore
/// remrpc::remote_functions! {
///     pub struct CalcClient {
///         fn add(a: i64, b: i64) -> i64;
///         fn greet(name: String) -> String;
///     }
/// }
///
/// let calc = CalcClient::new(engine.invoker("chan:calc"));
/// assert_eq!(calc.add(2, 3).await, Ok(5));
/// ```
#[macro_export]
macro_rules! remote_functions {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(fn $func:ident($($arg:ident : $arg_ty:ty),* $(,)?) -> $ret:ty;)*
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone)]
        $vis struct $name {
            invoker: $crate::Invoker,
        }

        impl $name {
            pub fn new(invoker: $crate::Invoker) -> Self {
                Self { invoker }
            }

            pub fn invoker(&self) -> &$crate::Invoker {
                &self.invoker
            }

            $(
                pub async fn $func(&self, $($arg: $arg_ty),*) -> Result<$ret, $crate::RpcError> {
                    self.invoker.call_as::<_, $ret>(stringify!($func), ($($arg,)*)).await
                }
            )*
        }
    };
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use remrpc_transport_vnet::{VnetEarth, VnetTransport};
    use rmpv::Value;

    use super::to_positional;
    use crate::{
        config::RpcConfig,
        engine::RpcEngine,
        error::{ErrorCode, RpcError},
        registry::{reply, CallArgs},
    };

    remote_functions! {
        struct Calc {
            fn add(a: i64, b: i64) -> i64;
            fn greet(name: String) -> String;
            fn nothing() -> ();
            fn missing() -> i64;
        }
    }

    #[test]
    fn should_flatten_positional_args() {
        assert_eq!(to_positional((1, "a")), Ok(vec![Value::from(1), Value::from("a")]));
        assert_eq!(to_positional(()), Ok(vec![]));
        assert_eq!(to_positional(7), Ok(vec![Value::from(7)]));
        assert_eq!(to_positional(vec![1, 2]), Ok(vec![Value::from(1), Value::from(2)]));
    }

    struct Unserializable;

    impl serde::Serialize for Unserializable {
        fn serialize<S: serde::Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("not serializable"))
        }
    }

    #[async_std::test]
    async fn bad_arguments_should_fail_before_publish() {
        let earth = Arc::new(VnetEarth::default());
        let client = RpcEngine::start(RpcConfig::new("client"), Arc::new(VnetTransport::new(earth.clone()))).await.expect("Should start");

        let res: Result<i64, RpcError> = client.invoker("calc").call_as("add", (1, Unserializable)).await;
        assert!(matches!(res, Err(RpcError::InvalidArgument(msg)) if msg.contains("not serializable")));
        assert_eq!(earth.published_count(), 0);
        assert_eq!(client.pending_calls(), 0);

        client.close().await;
    }

    #[async_std::test]
    async fn typed_client_should_call_remote() {
        let earth = Arc::new(VnetEarth::default());
        let server = RpcEngine::start(RpcConfig::new("calc"), Arc::new(VnetTransport::new(earth.clone()))).await.expect("Should start");
        let client = RpcEngine::start(RpcConfig::new("client"), Arc::new(VnetTransport::new(earth.clone()))).await.expect("Should start");
        server.register("add", |args: CallArgs| {
            let (a, b): (i64, i64) = args.parse()?;
            reply(a + b)
        });
        server.register("greet", |args: CallArgs| {
            let name: String = args.arg(0)?;
            reply(format!("Hello {}", name))
        });
        server.register("nothing", |_args: CallArgs| Ok(Value::Nil));

        let calc = Calc::new(client.invoker("calc").with_timeout(Duration::from_secs(1)));
        assert_eq!(calc.invoker().channel(), "calc");
        assert_eq!(calc.add(2, 3).await, Ok(5));
        assert_eq!(calc.greet("World".to_string()).await, Ok("Hello World".to_string()));
        assert_eq!(calc.nothing().await, Ok(()));
        assert_eq!(calc.missing().await.map_err(|e| e.code()), Err(Some(ErrorCode::Unregistered)));

        let wrong: Result<String, RpcError> = client.invoker("calc").call_as("add", (1, 2)).await;
        assert!(matches!(wrong, Err(RpcError::RetvalError(_))));

        client.close().await;
        server.close().await;
    }
}
