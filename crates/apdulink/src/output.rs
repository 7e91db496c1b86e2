use std::io::{IsTerminal, Write};

use apdulink_session::{split_status, StatusWord};
use apdulink_transport::DeviceDescriptor;
use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct DeviceListOutput<'a> {
    count: usize,
    devices: Vec<DeviceOutput<'a>>,
}

#[derive(Serialize)]
struct DeviceOutput<'a> {
    index: usize,
    #[serde(flatten)]
    descriptor: &'a DeviceDescriptor,
}

pub fn print_devices(devices: &[DeviceDescriptor], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = DeviceListOutput {
                count: devices.len(),
                devices: devices
                    .iter()
                    .enumerate()
                    .map(|(index, descriptor)| DeviceOutput { index, descriptor })
                    .collect(),
            };
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec![
                    "INDEX", "VID:PID", "PRODUCT", "SERIAL", "USAGE PAGE", "IFACE", "PATH",
                ]);
            for (index, d) in devices.iter().enumerate() {
                table.add_row(vec![
                    index.to_string(),
                    format!("{:04x}:{:04x}", d.vendor_id, d.product_id),
                    d.product.clone().unwrap_or_default(),
                    d.serial_number.clone().unwrap_or_default(),
                    format!("0x{:04x}", d.usage_page),
                    d.interface_number.to_string(),
                    d.path.clone(),
                ]);
            }
            println!("{table}");
            println!("{} device(s)", devices.len());
        }
        OutputFormat::Pretty => {
            println!("{} device(s)", devices.len());
            for (index, d) in devices.iter().enumerate() {
                println!("  [{index}] {d}");
            }
        }
        OutputFormat::Raw => {
            for d in devices {
                println!("{}", d.path);
            }
        }
    }
}

#[derive(Serialize)]
struct ExchangeOutput {
    command: String,
    response: String,
    data: String,
    status: Option<String>,
    success: bool,
    length: usize,
}

impl ExchangeOutput {
    fn new(command: &[u8], response: &[u8]) -> Self {
        let (data, status) = match split_status(response) {
            Some((data, sw)) => (data, Some(sw)),
            None => (response, None),
        };
        Self {
            command: hex::encode(command),
            response: hex::encode(response),
            data: hex::encode(data),
            status: status.map(|sw| sw.to_string()),
            success: status.is_some_and(StatusWord::is_success),
            length: response.len(),
        }
    }
}

pub fn print_exchange(command: &[u8], response: &[u8], format: OutputFormat) {
    let out = ExchangeOutput::new(command, response);
    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["COMMAND", "DATA", "SW", "LENGTH"])
                .add_row(vec![
                    out.command.clone(),
                    out.data.clone(),
                    out.status.clone().unwrap_or_default(),
                    out.length.to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("=> {}", out.command);
            println!("<= {}", out.response);
            if let Some(sw) = &out.status {
                let verdict = if out.success { "success" } else { "error" };
                println!("SW {sw} ({verdict})");
            }
        }
        OutputFormat::Raw => print_raw(response),
    }
}

pub fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}
