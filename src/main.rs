#![cfg(feature = "cli")]
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use base64::Engine;
use clap::{ArgAction, Parser, Subcommand};
use prost::Message;
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::traits::PublicKeyParts;
use serde::Serialize;
use tracing::{debug, info, Level};

use vinecdm::cdm::{Cdm, COMMON_PRIVACY_CERT};
use vinecdm::device::{Device, LocalDevice};
use vinecdm::license_protocol::ClientIdentification;
use vinecdm::remotecdm::{RemoteDevice, RemoteDeviceConfig};

#[derive(Parser)]
#[command(name = "vinecdm", version, about = "Widevine CDM client")]
struct Cli {
    #[arg(short = 'd', long = "debug", action = ArgAction::SetTrue)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

/// CLI subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Print the details of a Widevine Device (.wvd) file.
    Info {
        /// WVD path or URL.
        device: String,
    },
    /// Build a license challenge for a PSSH.
    ///
    /// The challenge is printed as base64 unless an output file is given.
    Challenge {
        /// WVD path or URL, or a YAML remote device config.
        device: String,
        /// Base64 PSSH box, Widevine cenc header, or raw init data with --raw.
        pssh: String,
        #[arg(long, action = ArgAction::SetTrue)]
        raw: bool,
        #[arg(long, action = ArgAction::SetTrue)]
        offline: bool,
        /// Service certificate as base64, a file path, or `common`.
        #[arg(short = 'c', long = "certificate")]
        certificate: Option<String>,
        #[arg(short = 'o', long = "output")]
        output: Option<PathBuf>,
    },
    /// Export a WVD file as a provisioning directory.
    Export {
        /// WVD path or URL.
        device: String,
        #[arg(short = 'o', long = "out_dir")]
        out_dir: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.debug { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt().with_max_level(level).init();
    debug!("vinecdm version {}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Info { device } => run_info(&device),
        Commands::Challenge {
            device,
            pssh,
            raw,
            offline,
            certificate,
            output,
        } => run_challenge(
            &device,
            &pssh,
            raw,
            offline,
            certificate.as_deref(),
            output.as_deref(),
        ),
        Commands::Export { device, out_dir } => run_export(&device, out_dir.as_deref()),
    }
}

#[derive(Serialize)]
struct DeviceSummary {
    device_type: String,
    system_id: Option<u32>,
    security_level: u8,
    send_key_control_nonce: bool,
    private_key_bits: Option<usize>,
    client_id_size: usize,
    client_info: BTreeMap<String, String>,
    vmp: bool,
}

fn run_info(uri: &str) -> anyhow::Result<()> {
    let device = LocalDevice::load(uri, true).context("Failed to load device")?;
    let client_id = device.client_id.as_ref();

    let summary = DeviceSummary {
        device_type: device.device_type.to_string(),
        system_id: device.system_id,
        security_level: device.security_level,
        send_key_control_nonce: device.flags.send_key_control_nonce,
        private_key_bits: device.private_key.as_ref().map(|key| key.n().bits()),
        client_id_size: client_id.map(|c| c.encoded_len()).unwrap_or_default(),
        client_info: client_id.map(client_info_map).unwrap_or_default(),
        vmp: device.vmp.is_some(),
    };
    print!("{}", serde_yaml::to_string(&summary)?);
    Ok(())
}

fn run_challenge(
    uri: &str,
    pssh: &str,
    raw: bool,
    offline: bool,
    certificate: Option<&str>,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    let device = load_device(uri)?;
    info!(
        "[+] Loaded Device ({} L{})",
        device
            .system_id()
            .map(|id| id.to_string())
            .unwrap_or_else(|| "unknown".to_string()),
        device.security_level()
    );

    let init_data = base64::engine::general_purpose::STANDARD
        .decode(pssh.trim())
        .context("PSSH must be base64")?;

    let mut cdm = Cdm::new(device);
    let session_id = cdm.open(&init_data, raw, offline)?;
    info!("[+] Opened CDM Session: {}", hex::encode(&session_id));

    if let Some(certificate) = certificate {
        let certificate = read_certificate(certificate)?;
        cdm.set_service_certificate(&session_id, &certificate)?;
        info!("[+] Set Service Privacy Certificate");
    }

    let challenge = cdm.get_license_challenge(&session_id)?;
    info!("[+] Created License Request Message (Challenge)");

    match output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, &challenge)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!("[+] Saved challenge to {}", path.display());
        }
        None => println!(
            "{}",
            base64::engine::general_purpose::STANDARD.encode(&challenge)
        ),
    }

    cdm.close(&session_id)?;
    Ok(())
}

fn run_export(uri: &str, out_dir: Option<&Path>) -> anyhow::Result<()> {
    let device = LocalDevice::load(uri, true).context("Failed to load WVD")?;
    let client_id = device
        .client_id
        .as_ref()
        .context("Device has no client identification")?;

    let out_path = match out_dir {
        Some(out_dir) => out_dir.to_path_buf(),
        None => PathBuf::from(
            Path::new(uri)
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("device"),
        ),
    };

    if out_path.exists() {
        if out_path.read_dir()?.next().is_some() {
            anyhow::bail!("Output directory is not empty, cannot overwrite.");
        }
    } else {
        std::fs::create_dir_all(&out_path)?;
    }

    let config = serde_json::json!({
        "session_id_type": device.device_type.to_string().to_lowercase(),
        "security_level": device.security_level,
        "send_key_control_nonce": device.flags.send_key_control_nonce,
    });
    std::fs::write(out_path.join("wv.json"), serde_json::to_vec_pretty(&config)?)?;
    info!("Exported device config as wv.json");

    if let Some(ref private_key) = device.private_key {
        std::fs::write(
            out_path.join("device_private_key"),
            private_key.to_pkcs1_der()?.as_bytes(),
        )?;
        info!("Exported Private Key as device_private_key");
    } else {
        info!("No Private Key available");
    }

    std::fs::write(out_path.join("device_client_id_blob"), client_id.encode_to_vec())?;
    info!("Exported Client ID as device_client_id_blob");

    if let Some(ref vmp) = device.vmp {
        std::fs::write(out_path.join("device_vmp_blob"), vmp.encode_to_vec())?;
        info!("Exported VMP (File Hashes) as device_vmp_blob");
    } else {
        info!("No VMP (File Hashes) available");
    }

    info!("Saved to {}", out_path.display());
    Ok(())
}

fn load_device(uri: &str) -> anyhow::Result<Arc<dyn Device>> {
    if uri.ends_with(".yml") || uri.ends_with(".yaml") {
        let config: RemoteDeviceConfig = serde_yaml::from_str(
            &std::fs::read_to_string(uri).context("Failed to read remote device config")?,
        )?;
        return Ok(Arc::new(RemoteDevice::from_config(config)?));
    }
    Ok(Arc::new(
        LocalDevice::load(uri, true).context("Failed to load device")?,
    ))
}

fn read_certificate(value: &str) -> anyhow::Result<Vec<u8>> {
    let engine = base64::engine::general_purpose::STANDARD;
    if value.eq_ignore_ascii_case("common") {
        return Ok(engine.decode(COMMON_PRIVACY_CERT)?);
    }
    let path = Path::new(value);
    if path.is_file() {
        return std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()));
    }
    engine
        .decode(value.trim())
        .context("Certificate is neither a file nor base64")
}

fn client_info_map(client_id: &ClientIdentification) -> BTreeMap<String, String> {
    client_id
        .client_info
        .iter()
        .filter_map(|entry| Some((entry.name.clone()?, entry.value.clone()?)))
        .collect()
}
