use crate::app::cli::take_option;
use crate::app::command_support::{map_config_err, read_settings, CliContext};
use crate::monitor::{bind_monitor, run_monitor, MonitorOptions, WriterSink};
use crate::orchestration::CancellationToken;
use std::sync::Arc;
use std::time::Duration;

pub fn cmd_monitor(ctx: &CliContext, args: &[String]) -> Result<String, String> {
    let mut args = args.to_vec();
    let bind = take_option(&mut args, "bind")?;
    if !args.is_empty() {
        return Err("usage: monitor [--bind <addr>]".to_string());
    }

    let settings = read_settings(ctx)?;
    let addr = bind.unwrap_or_else(|| settings.monitor.bind.clone());
    let options = MonitorOptions {
        state_root: settings.resolve_state_root().map_err(map_config_err)?,
        explorer: settings
            .monitor
            .check_storage
            .then(|| settings.explorer_client()),
        check_interval: Duration::from_secs(settings.explorer.check_interval_secs),
    };

    let listener = bind_monitor(&addr).map_err(|err| err.to_string())?;
    eprintln!("monitor listening on ws://{addr}");
    let sink = Arc::new(WriterSink::new(std::io::stdout()));
    run_monitor(listener, sink, options, CancellationToken::new()).map_err(|err| err.to_string())?;
    Ok("monitor stopped".to_string())
}
