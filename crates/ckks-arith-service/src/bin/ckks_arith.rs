//! Local demo of the encrypted arithmetic service.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use ckks_arith_service::{telemetry, EncryptedArithmeticService, ServiceConfig};
use clap::{Parser, Subcommand};
use tracing::info;

#[derive(Parser, Debug)]
#[command(version, about = "CKKS encrypted arithmetic")]
struct Cli {
    /// YAML configuration file (CKKS_ARITH_* environment variables override it)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Encrypt two numbers, add and multiply them encrypted, then decrypt
    Demo {
        #[arg(long, default_value_t = 7.0, allow_hyphen_values = true)]
        a: f64,
        #[arg(long, default_value_t = 3.0, allow_hyphen_values = true)]
        b: f64,
    },
    /// Print the parameter set the configuration resolves to
    Params,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = ServiceConfig::load(cli.config.as_deref())?;
    telemetry::init_tracing(&config.log_filter)?;

    match cli.command {
        Command::Demo { a, b } => demo(&config, a, b),
        Command::Params => params(&config),
    }
}

fn params(config: &ServiceConfig) -> Result<()> {
    let params = config
        .parameter_set()
        .context("invalid encryption parameters")?;
    println!("parameter set    {}", params.id());
    println!("ring degree      {}", params.ring_degree());
    println!("slots            {}", params.num_slots());
    println!(
        "modulus chain    {:?} ({} bits)",
        params.moduli().iter().map(|m| m.value).collect::<Vec<_>>(),
        params.total_modulus_bits()
    );
    println!("scale            2^{}", params.scale_bits());
    println!("security         {}", params.security_level());
    println!("depth            {}", params.max_level());
    Ok(())
}

fn demo(config: &ServiceConfig, a: f64, b: f64) -> Result<()> {
    let started = Instant::now();
    let service =
        EncryptedArithmeticService::from_config(config).context("invalid encryption parameters")?;
    info!(elapsed_ms = started.elapsed().as_millis() as u64, "keys generated");

    let ct_a = service.encrypt(a).context("encrypt a")?;
    let ct_b = service.encrypt(b).context("encrypt b")?;
    println!("encrypt({a}) -> {}", service.ciphertext_size(&ct_a));
    println!("encrypt({b}) -> {}", service.ciphertext_size(&ct_b));

    let sum = service.add(&ct_a, &ct_b).context("add")?;
    println!(
        "decrypt(add)      = {} (raw {:.6})",
        service.decrypt(&sum)?,
        service.decrypt_value(&sum)?
    );

    let product = service.multiply(&ct_a, &ct_b).context("multiply")?;
    println!(
        "decrypt(multiply) = {} (raw {:.6}, level {}, {})",
        service.decrypt(&product)?,
        service.decrypt_value(&product)?,
        service.level(&product)?,
        service.ciphertext_size(&product)
    );

    info!(elapsed_ms = started.elapsed().as_millis() as u64, "demo finished");
    Ok(())
}
