// src/core/bootstrap.rs

use crate::common::log::{log, LogLevel};
use crate::common::setup;
use crate::core::requirement;
use crate::middlewares::rate_limiting;
use chrono::Local;
use sysinfo::System;

pub async fn init() {
    print_banner();

    log(LogLevel::Info, "✓ Starting...");
    setup::ensure_directories();
    setup::init_token();
    requirement::run_dependency_check();
    rate_limiting::start_cleanup_task();

    crate::modules::axum::core::start().await;
}

fn print_banner() {
    let cargo_version = env!("CARGO_PKG_VERSION");
    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
    let sys = System::new_all();

    // OS and Kernel
    let os_info =
        System::long_os_version().unwrap_or_else(|| System::os_version().unwrap_or_default());
    let kernel_name = System::name().unwrap_or_default().to_lowercase();
    let kernel_version = System::kernel_version().unwrap_or_default();

    // CPU
    let cpus = sys.cpus();
    let cpu_brand = cpus.first().map(|cpu| cpu.brand().trim()).unwrap_or("");
    let core_count = cpus.len();
    let arch = System::cpu_arch().unwrap_or_else(|| "Unknown Arch".to_string());

    // Memory
    const GIB: f64 = 1024.0 * 1024.0 * 1024.0;
    let total_ram_gb = (sys.total_memory() as f64 / GIB).round() as u64;
    let used_ram_percent =
        (sys.used_memory() as f64 / sys.total_memory() as f64 * 100.0).round() as u64;

    // Machine ID
    let fid = machine_uid::get().unwrap_or_else(|_| "Unavailable".to_string());

    let line1 = format!("{}{} {}", os_info, kernel_name, kernel_version);
    let line2 = format!(
        "{}({}) {} {}GB {}%",
        cpu_brand, core_count, arch, total_ram_gb, used_ram_percent
    );

    println!();
    const GREEN: &str = "\x1b[32m";
    const RESET: &str = "\x1b[0m";

    println!("  {}{}{}{}", GREEN, "⛏ Moddock ", cargo_version, RESET);
    println!("  - Timestamp: {}", timestamp);
    println!("  - Environment:");
    println!("    ✓ {}", line1);
    println!("    ✓ {}", line2);
    println!("    ✓ {}", fid);
    println!();
}
