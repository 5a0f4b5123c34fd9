#![deny(unsafe_code)]

use std::sync::Arc;

use structopt::StructOpt;

use mqtt_intake::broker::Broker;
use mqtt_intake::context::BrokerContext;
use mqtt_intake::event::LogListener;
use mqtt_intake::intercept::{LogObserver, TelemetryStep};
use mqtt_intake::settings::Settings;

#[derive(Debug, StructOpt)]
#[structopt(name = "mqtt-intaked")]
struct Options {
    /// Configuration file name
    #[structopt(short = "f", long = "cfg")]
    cfg_name: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[structopt(long = "log-level", default_value = "info")]
    log_level: log::LevelFilter,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opts = Options::from_args();

    simple_logger::SimpleLogger::new().with_level(opts.log_level).init()?;

    let settings = Settings::new(opts.cfg_name.as_deref())?;
    log::info!("listen config: {} {}", settings.listen.name, settings.listen.addr);

    let scx = BrokerContext::new(settings)
        .listener(Arc::new(LogListener))
        .step(Arc::new(TelemetryStep::new(Arc::new(LogObserver))))
        .build()
        .await;

    let broker = Broker::new(scx);
    broker.start().await?;
    log::info!("broker running, Ctrl-C to exit");

    tokio::signal::ctrl_c().await?;
    broker.stop().await?;
    Ok(())
}
