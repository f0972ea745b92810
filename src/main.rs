// ==========================================
// 纺织生产追溯系统 - 命令行入口
// ==========================================
// 用法:
//   textile-trace init
//   textile-trace import-looms <csv>
//   textile-trace lookup <scan_code>
// 数据库: TEXTILE_TRACE_DB_PATH 或用户数据目录
// ==========================================

use std::path::Path;

use textile_trace::api::ErrorResponse;
use textile_trace::app::{get_default_db_path, AppState};

const CLI_ACTOR: &str = "cli";

const USAGE: &str = "用法:
  textile-trace init
  textile-trace import-looms <csv>
  textile-trace lookup <scan_code>";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    textile_trace::logging::init();

    let mut args = std::env::args().skip(1);
    let command = args.next().unwrap_or_default();

    let db_path = get_default_db_path();
    tracing::info!(version = textile_trace::VERSION, db_path = %db_path, "textile-trace 启动");
    let state = AppState::new(db_path)?;

    match command.as_str() {
        "init" => {
            println!("数据库已就绪: {}", state.db_path);
        }
        "import-looms" => {
            let path = args.next().ok_or(USAGE)?;
            match state.loom_api.import_looms_csv(Path::new(&path), CLI_ACTOR) {
                Ok(report) => println!("{}", serde_json::to_string_pretty(&report)?),
                Err(e) => return fail(&e),
            }
        }
        "lookup" => {
            let code = args.next().ok_or(USAGE)?;
            match state.fabric_cut_api.lookup_by_scan_code(&code).await {
                Ok(view) => println!("{}", serde_json::to_string_pretty(&view)?),
                Err(e) => return fail(&e),
            }
        }
        _ => {
            eprintln!("{}", USAGE);
            std::process::exit(2);
        }
    }
    Ok(())
}

fn fail(err: &textile_trace::api::ApiError) -> Result<(), Box<dyn std::error::Error>> {
    let body = ErrorResponse::from(err);
    eprintln!("{}", serde_json::to_string_pretty(&body)?);
    std::process::exit(1);
}
