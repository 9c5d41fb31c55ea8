mod bus;
mod connector;
mod control;
mod dial;
mod display;
mod host;
mod ota;
mod peripherals;
mod sensor;
mod shadow_applier;
mod transport;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    host::run().await
}
