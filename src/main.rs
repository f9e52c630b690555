use std::fs;
use std::path::PathBuf;

use image_chain_backend::api::server::{build_service, serve};
use image_chain_backend::config::ServiceConfig;
use image_chain_backend::pipeline::service::ProcessRequest;
use image_chain_backend::storage::StorageLayout;
use serde_json::{json, Value};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let cli_args = std::env::args().skip(1).collect::<Vec<_>>();
    match cli_args.first().map(String::as_str) {
        Some("process") => {
            return run_process_cli(cli_args.into_iter().skip(1).collect::<Vec<_>>()).await;
        }
        Some("-h" | "--help") => {
            print_usage();
            return Ok(());
        }
        Some(unknown) => {
            return Err(std::io::Error::other(format!(
                "Unknown command: {unknown}\n\nUse --help for usage."
            ))
            .into());
        }
        None => {}
    }

    let config = ServiceConfig::load(&std::env::current_dir()?)?;
    serve(config).await?;
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn run_process_cli(args: Vec<String>) -> Result<(), Box<dyn std::error::Error>> {
    if args
        .iter()
        .any(|arg| matches!(arg.as_str(), "-h" | "--help"))
    {
        print_usage();
        return Ok(());
    }

    let mut app_root = std::env::current_dir()?;
    let mut file = None::<String>;
    let mut operations_path = None::<PathBuf>;

    let mut i = 0usize;
    while i < args.len() {
        let flag = args[i].as_str();
        let needs_value = |idx: usize| -> Result<String, Box<dyn std::error::Error>> {
            let Some(value) = args.get(idx + 1) else {
                return Err(std::io::Error::other(format!("Missing value for {flag}")).into());
            };
            Ok(value.clone())
        };

        match flag {
            "--app-root" => {
                app_root = PathBuf::from(needs_value(i)?);
                i += 2;
            }
            "--file" => {
                file = Some(needs_value(i)?);
                i += 2;
            }
            "--operations" => {
                operations_path = Some(PathBuf::from(needs_value(i)?));
                i += 2;
            }
            unknown => {
                return Err(std::io::Error::other(format!(
                    "Unknown argument: {unknown}\n\nUse --help for usage."
                ))
                .into());
            }
        }
    }

    let Some(operations_path) = operations_path else {
        return Err(std::io::Error::other("Missing required --operations <json-file>").into());
    };
    let raw: Value = serde_json::from_str(&fs::read_to_string(&operations_path)?)?;
    // Accept a bare array or a `{ "operations": [...] }` document.
    let operations = match raw {
        Value::Array(items) => Some(items),
        Value::Object(mut map) => match map.remove("operations") {
            Some(Value::Array(items)) => Some(items),
            _ => None,
        },
        _ => None,
    };

    let config = ServiceConfig::load(&app_root)?;
    StorageLayout::from_config(&config).ensure_dirs()?;
    let service = build_service(&config);

    match service.process(ProcessRequest { filename: file, operations }).await {
        Ok(outcome) => {
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "success": true,
                    "outputFile": outcome.output_file,
                    "path": StorageLayout::output_url(&outcome.output_file),
                    "localPath": outcome.output_path.display().to_string(),
                    "commands": outcome.commands,
                    "source": outcome.source,
                    "originalFilename": outcome.original_filename,
                }))?
            );
            Ok(())
        }
        Err(err) => {
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "success": false,
                    "error": err.to_string(),
                    "error_code": err.code(),
                    "error_step": err.step(),
                }))?
            );
            Err(err.into())
        }
    }
}

fn print_usage() {
    eprintln!(concat!(
        "Usage:\n",
        "  image-chain-backend                      serve HTTP (see IMAGE_CHAIN_BIND)\n",
        "  image-chain-backend process --file <name-or-url> --operations <json-file> [--app-root PATH]\n\n",
        "Notes:\n",
        "  --file names an image in the uploads directory, or an http(s) URL to download\n",
        "  --operations is a JSON array of {{\"type\", \"params\"}} objects, or {{\"operations\": [...]}}\n",
        "  settings: config/service.settings.toml, .env, then IMAGE_CHAIN_* environment variables\n"
    ));
}
