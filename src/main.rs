use anyhow::Context;
use colored::Colorize;

fn try_main() -> anyhow::Result<()> {
    let result = thesis_ledger::run();
    let class = result.as_ref().err().map(|e| e.class()).unwrap_or("ok");
    result.with_context(|| format!("[{}]", class))
}

fn main() {
    thesis_ledger::core::logging::init();

    if let Err(err) = try_main() {
        eprintln!("{} {:#}", "error:".red().bold(), err);
        std::process::exit(1);
    }
}
