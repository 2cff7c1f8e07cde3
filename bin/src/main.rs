use std::{sync::Arc, time::Duration};

use clap::Parser;
use remrpc::{reply, CallArgs, DispatchMode, HandlerError, RpcConfig, RpcEngine, RpcError, RpcFunction, Value};
use remrpc_transport_vnet::{VnetEarth, VnetTransport};

/// Run two rpc engines over an in-process broker and call each other
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Channel of the engine serving the math functions
    #[arg(env, long, default_value = "channel:rpc1")]
    server_channel: String,

    /// Channel of the engine issuing calls
    #[arg(env, long, default_value = "channel:rpc2")]
    client_channel: String,

    /// Call timeout in milliseconds
    #[arg(env, long, default_value_t = remrpc::DEFAULT_TIMEOUT_MS)]
    timeout_ms: u64,

    /// Workers running handlers of each engine
    #[arg(env, long, default_value_t = 4)]
    workers: usize,

    /// Run handlers on the poll task instead of a worker pool
    #[arg(env, long)]
    inline: bool,
}

struct SayHello;

impl RpcFunction for SayHello {
    fn invoke(&self, args: CallArgs) -> Result<Value, HandlerError> {
        let name: String = args.arg(0)?;
        reply(format!("Hello {}", name))
    }
}

fn register_server(server: &RpcEngine) {
    server.register("add", |args: CallArgs| {
        let (a, b): (i64, i64) = args.parse()?;
        reply(a + b)
    });
    server.register("sub", |args: CallArgs| {
        let (a, b): (i64, i64) = args.parse()?;
        reply(a - b)
    });
    server.register("multi", |args: CallArgs| {
        args.expect_arity(0)?;
        reply(("Hello", "World"))
    });
    server.register("kvfunc", |args: CallArgs| {
        let k: String = args.kwarg("k")?.unwrap_or_else(|| "key".to_string());
        let v: String = args.kwarg("v")?.unwrap_or_else(|| "val".to_string());
        reply(format!("{} = {}", k, v))
    });
    server.register("sayhello", SayHello);
    server.register("nonreturn", |_args: CallArgs| -> Result<Value, HandlerError> {
        log::info!("Non Return");
        Ok(Value::Nil)
    });
}

fn show(name: &str, res: Result<Value, RpcError>) {
    match res {
        Ok(value) => log::info!("{} => {}", name, value),
        Err(RpcError::Timeout) => log::warn!("{} => RPC Timedout", name),
        Err(RpcError::CallError { code, detail }) => log::warn!("{} => RPC Call Error ({}): {}", name, code, detail),
        Err(err) => log::error!("{} => RPC Exception: {}", name, err),
    }
}

async fn run(args: Args) -> Result<(), RpcError> {
    let dispatch = if args.inline {
        DispatchMode::Inline
    } else {
        DispatchMode::Pool { workers: args.workers }
    };
    let timeout = Duration::from_millis(args.timeout_ms);
    let earth = Arc::new(VnetEarth::default());

    let server_cfg = RpcConfig::new(&args.server_channel).with_timeout(timeout).with_dispatch(dispatch);
    let server = RpcEngine::start(server_cfg, Arc::new(VnetTransport::new(earth.clone()))).await?;
    let client_cfg = RpcConfig::new(&args.client_channel).with_timeout(timeout).with_dispatch(dispatch);
    let client = RpcEngine::start(client_cfg, Arc::new(VnetTransport::new(earth.clone()))).await?;
    register_server(&server);

    let to_server = client.invoker(&args.server_channel);
    let nested = to_server.clone();
    client.register("x2", move |args: CallArgs| {
        let x: i64 = args.arg(0)?;
        nested.call_blocking("add", vec![Value::from(x), Value::from(x)]).map_err(HandlerError::failed)
    });

    if args.inline {
        log::warn!("skip x2, nested calls need the worker pool");
    } else {
        show("x2(3)", server.invoker(&args.client_channel).call("x2", vec![Value::from(3)]).await);
    }
    show("add(1, 2)", to_server.call("add", vec![Value::from(1), Value::from(2)]).await);
    show("sub(9, 5)", to_server.call("sub", vec![Value::from(9), Value::from(5)]).await);
    show("multi()", to_server.call("multi", vec![]).await);
    show(
        "kvfunc(k=KEY, v=VALUE)",
        to_server
            .call_with_kwargs("kvfunc", vec![], vec![(Value::from("k"), Value::from("KEY")), (Value::from("v"), Value::from("VALUE"))])
            .await,
    );
    show("sayhello(World)", to_server.call("sayhello", vec![Value::from("World")]).await);
    show("nonreturn()", to_server.call("nonreturn", vec![]).await);
    show("nonexistent()", to_server.call("nonexistent", vec![]).await);

    client.close().await;
    server.close().await;
    Ok(())
}

#[async_std::main]
async fn main() {
    env_logger::builder().format_timestamp_millis().filter_level(log::LevelFilter::Info).parse_default_env().init();
    let args: Args = Args::parse();
    if let Err(err) = run(args).await {
        log::error!("demo failed: {}", err);
    }
}
