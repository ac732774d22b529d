use anyhow::Result;
use clap::{Parser, Subcommand};
use std::process::Command;

#[derive(Parser)]
#[command(name = "xtask", about = "Workspace automation for drydock")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run all checks: fmt, clippy, tests (debug and release), doc
    Check,
    /// Run cargo fmt --check on all crates
    Fmt,
    /// Run clippy on all crates
    Clippy,
    /// Run all tests
    Test {
        /// Also run with debug assertions off
        #[arg(long)]
        release: bool,
    },
    /// Build rustdoc for the workspace
    Doc,
    /// Run the seeded destruction demo on virtual time
    Demo {
        #[arg(short, long, default_value = "42")]
        seed: u64,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Check => {
            fmt()?;
            clippy()?;
            test(true)?;
            doc()?;
        }
        Commands::Fmt => fmt()?,
        Commands::Clippy => clippy()?,
        Commands::Test { release } => test(release)?,
        Commands::Doc => doc()?,
        Commands::Demo { seed } => {
            let seed = seed.to_string();
            cargo(
                "demo",
                &["run", "-p", "drydock-cli", "--", "run", "--seed", &seed],
            )?;
        }
    }

    Ok(())
}

fn cargo(step: &str, args: &[&str]) -> Result<()> {
    println!("==> cargo {}", args.join(" "));
    let status = Command::new("cargo").args(args).status()?;
    if !status.success() {
        anyhow::bail!("{step} failed");
    }
    Ok(())
}

fn fmt() -> Result<()> {
    cargo("fmt check", &["fmt", "--all", "--", "--check"])
}

fn clippy() -> Result<()> {
    cargo(
        "clippy",
        &["clippy", "--workspace", "--all-targets", "--", "-D", "warnings"],
    )
}

fn test(release: bool) -> Result<()> {
    cargo("tests", &["test", "--workspace"])?;
    // Lock-order checks are debug assertions; make sure nothing depends on them.
    if release {
        cargo("release tests", &["test", "--workspace", "--release"])?;
    }
    Ok(())
}

fn doc() -> Result<()> {
    cargo("doc", &["doc", "--workspace", "--no-deps"])
}
