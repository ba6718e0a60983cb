// SQL Optimizer - Build Task Runner
// Unified build system using cargo xtask pattern

use anyhow::{Context, Result};
use xshell::{cmd, Shell};

fn main() -> Result<()> {
    let sh = Shell::new()?;
    let args: Vec<_> = std::env::args().skip(1).collect();

    match args.get(0).map(|s| s.as_str()) {
        Some("build") => {
            let release = args.contains(&"--release".to_string());
            build(&sh, release)
        }
        Some("test") => test(&sh),
        Some("format") => {
            let check = args.contains(&"--check".to_string());
            format(&sh, check)
        }
        Some("clippy") => clippy(&sh),
        Some("run") => run(&sh, &args[1..]),
        Some("clean") => clean(&sh),
        Some("coverage") => coverage(&sh),
        Some("ci") => ci(&sh),
        Some("dist") => dist(&sh),
        Some("install") => {
            if args.len() < 2 {
                eprintln!("Error: install requires a destination path");
                eprintln!("Usage: cargo xtask install <destination>");
                std::process::exit(1);
            }
            install(&sh, &args[1])
        }
        _ => {
            print_help();
            Ok(())
        }
    }
}

fn print_help() {
    println!("SQL Optimizer - Build Commands:");
    println!();
    println!("Usage: cargo xtask <COMMAND> [OPTIONS]");
    println!();
    println!("Commands:");
    println!("  build [--release]   Build the optimizer binary");
    println!("  test                Run all tests");
    println!("  format [--check]    Format code (check mode doesn't modify)");
    println!("  clippy              Run clippy checks");
    println!("  run [ARGS...]       Build and run the application");
    println!("  clean               Clean build artifacts");
    println!("  coverage            Generate test coverage report");
    println!("  ci                  Run all CI checks (format + clippy + build + test)");
    println!("  dist                Create distribution package (tar.gz)");
    println!("  install <path>      Build and install to specified path");
    println!();
    println!("Examples:");
    println!("  cargo xtask build");
    println!("  cargo xtask build --release");
    println!("  cargo xtask test");
    println!("  cargo xtask format --check");
}

/// Build the optimizer workspace
fn build(sh: &Shell, release: bool) -> Result<()> {
    println!("🔨 Building SQL Optimizer...");
    println!();

    if release {
        println!("🔍 [1/2] Running clippy checks...");
        clippy(sh)?;
        println!("✅ Clippy checks passed");
        println!();

        println!("🦀 [2/2] Building workspace (release)...");
        cmd!(sh, "cargo build --release --workspace")
            .run()
            .context("Failed to build workspace in release mode")?;
        println!("✅ Build complete");
        println!();

        create_distribution(sh)?;
        println!("📦 Distribution package location:");
        println!("   build/dist/");
    } else {
        println!("🦀 Building workspace...");
        cmd!(sh, "cargo build --workspace")
            .run()
            .context("Failed to build workspace")?;
        println!("✅ Build complete");
    }

    println!();
    println!("🎉 Build complete!");

    Ok(())
}

/// Create distribution package structure
fn create_distribution(sh: &Shell) -> Result<()> {
    let project = project_root();
    let dist_dir = project.join("build/dist");

    cmd!(sh, "mkdir -p {dist_dir}/bin").run()?;
    cmd!(sh, "mkdir -p {dist_dir}/conf").run()?;
    cmd!(sh, "mkdir -p {dist_dir}/logs").run()?;

    let binary_src = project.join("target/release/sql-optimizer");
    let binary_dst = dist_dir.join("bin/sql-optimizer");
    cmd!(sh, "cp {binary_src} {binary_dst}").run()?;

    let conf_src = project.join("conf");
    let conf_dst = dist_dir.join("conf");
    if conf_src.exists() {
        cmd!(sh, "cp -r {conf_src}/* {conf_dst}/").run()?;
    }

    Ok(())
}

/// Run all tests
fn test(sh: &Shell) -> Result<()> {
    println!("🧪 Running tests...");
    println!();

    cmd!(sh, "cargo test --workspace")
        .run()
        .context("Tests failed")?;

    println!();
    println!("✅ All tests passed!");

    Ok(())
}

/// Format code
fn format(sh: &Shell, check: bool) -> Result<()> {
    println!("🎨 Formatting code...");
    println!();

    if check {
        cmd!(sh, "cargo fmt --all -- --check")
            .run()
            .context("Rust code is not formatted")?;
        println!("✅ Rust code is properly formatted");
    } else {
        cmd!(sh, "cargo fmt --all")
            .run()
            .context("Failed to format Rust code")?;
        println!("✅ Rust code formatted");
    }

    Ok(())
}

/// Run clippy checks
fn clippy(sh: &Shell) -> Result<()> {
    cmd!(sh, "cargo clippy --workspace --release --all-targets -- --deny warnings --allow clippy::uninlined-format-args")
        .run()
        .context("Clippy checks failed")?;

    Ok(())
}

/// Build and run the application
fn run(sh: &Shell, args: &[String]) -> Result<()> {
    println!("🚀 Building and running SQL Optimizer...");
    println!();

    let mut cmd = cmd!(sh, "cargo run --bin sql-optimizer --");
    for arg in args {
        cmd = cmd.arg(arg);
    }

    cmd.run().context("Failed to run application")?;

    Ok(())
}

/// Clean build artifacts
fn clean(sh: &Shell) -> Result<()> {
    println!("🧹 Cleaning build artifacts...");
    println!();

    let project = project_root();

    println!("🗑️  Cleaning cargo target...");
    cmd!(sh, "cargo clean").run()?;

    println!("🗑️  Cleaning build directory...");
    let build_dir = project.join("build");
    if build_dir.exists() {
        cmd!(sh, "rm -rf {build_dir}").run()?;
    }

    println!();
    println!("✅ Clean complete!");

    Ok(())
}

/// Run all CI checks (format + clippy + build + test)
fn ci(sh: &Shell) -> Result<()> {
    println!("🔄 Running CI pipeline...");
    println!();

    println!("📝 [1/4] Checking code format...");
    format(sh, true)?;
    println!("✅ Format check passed");
    println!();

    println!("🔍 [2/4] Running clippy checks...");
    clippy(sh)?;
    println!("✅ Clippy checks passed");
    println!();

    println!("🔨 [3/4] Building project...");
    build(sh, true)?;
    println!("✅ Build successful");
    println!();

    println!("🧪 [4/4] Running tests...");
    test(sh)?;
    println!("✅ All tests passed");
    println!();

    println!("🎉 CI pipeline completed successfully!");

    Ok(())
}

/// Create distribution package (tar.gz)
fn dist(sh: &Shell) -> Result<()> {
    println!("📦 Creating distribution package...");
    println!();

    println!("🔨 Building release version...");
    build(sh, true)?;
    println!();

    let project = project_root();
    let dist_dir = project.join("build/dist");

    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let package_name = format!("sql-optimizer-{}.tar.gz", timestamp);
    let package_path = dist_dir.join(&package_name);

    println!("📋 Creating tarball: {}...", package_name);

    let _dir = sh.push_dir(&dist_dir);
    cmd!(sh, "tar czf {package_name} bin conf logs")
        .run()
        .context("Failed to create tarball")?;

    println!();
    println!("✅ Distribution package created!");
    println!("   Location: {}", package_path.display());
    println!(
        "   Size: {} MB",
        std::fs::metadata(&package_path)?.len() / 1024 / 1024
    );
    println!();
    println!("📝 To extract:");
    println!("   tar xzf {}", package_name);

    Ok(())
}

/// Install built binary to specified path
fn install(sh: &Shell, destination: &str) -> Result<()> {
    println!("📦 Installing SQL Optimizer to {}...", destination);
    println!();

    println!("🔨 Building release version...");
    build(sh, true)?;
    println!();

    let project = project_root();
    let binary_src = project.join("target/release/sql-optimizer");
    let dest_path = std::path::Path::new(destination);

    if let Some(parent) = dest_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create destination directory")?;
    }

    println!("📋 Copying binary to {}...", destination);
    std::fs::copy(&binary_src, dest_path).context("Failed to copy binary")?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = std::fs::metadata(dest_path)?.permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(dest_path, perms)?;
    }

    println!();
    println!("✅ Installation complete!");
    println!("   Binary: {}", destination);

    Ok(())
}

/// Generate test coverage report
fn coverage(sh: &Shell) -> Result<()> {
    println!("📊 Generating test coverage report...");
    println!();

    let tarpaulin_check = cmd!(sh, "cargo tarpaulin --version").ignore_status().run();

    if tarpaulin_check.is_err() {
        println!("⚠️  cargo-tarpaulin not found. Installing...");
        cmd!(sh, "cargo install cargo-tarpaulin")
            .run()
            .context("Failed to install cargo-tarpaulin")?;
    }

    cmd!(
        sh,
        "cargo tarpaulin --workspace --out Html --out Xml --output-dir build/coverage"
    )
    .run()
    .context("Failed to generate coverage report")?;

    println!();
    println!("✅ Coverage report generated!");
    println!("   HTML: build/coverage/index.html");
    println!("   XML:  build/coverage/cobertura.xml");

    Ok(())
}

/// Get project root directory
fn project_root() -> std::path::PathBuf {
    std::path::Path::new(&env!("CARGO_MANIFEST_DIR"))
        .ancestors()
        .nth(1)
        .unwrap()
        .to_path_buf()
}
