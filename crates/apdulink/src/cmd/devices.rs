use apdulink_frame::PacketConfig;
use apdulink_session::Admin;

use crate::cmd::{open_registry, Backend, DevicesArgs};
use crate::exit::{session_error, CliResult, SUCCESS};
use crate::output::{print_devices, print_json, OutputFormat};

#[derive(serde::Serialize)]
struct CountOutput {
    count: usize,
}

pub fn run(args: DevicesArgs, backend: Backend, format: OutputFormat) -> CliResult<i32> {
    let registry = open_registry(backend, PacketConfig::default())?;
    let admin = Admin::new(registry.as_ref()).with_filter(args.filter.to_filter()?);

    if args.count {
        let count = admin
            .count_devices()
            .map_err(|err| session_error("enumerate failed", err))?;
        match format {
            OutputFormat::Json => print_json(&CountOutput { count }),
            _ => println!("{count}"),
        }
        return Ok(SUCCESS);
    }

    let devices = admin
        .list_devices()
        .map_err(|err| session_error("enumerate failed", err))?;
    print_devices(&devices, format);
    Ok(SUCCESS)
}
