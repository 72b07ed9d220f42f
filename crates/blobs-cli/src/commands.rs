use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use anyhow::Context as _;
use blobs_crypto::DigestWriter;
use blobs_ingest::{ingest_with_config, Dependencies, IncomingBlob, IngestOutcome};
use blobs_store::BlobLocation;
use blobs_types::{Checksum, Context, Digest};
use colored::Colorize;
use serde_json::json;

use crate::cli::*;
use crate::config::CliConfig;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = CliConfig::load(cli.config.as_deref(), cli.root.as_deref())?;
    if matches!(cli.command, Command::Config(_)) {
        return cmd_config(&config, &cli.format);
    }

    let deps = Dependencies::from_config(&config.store).context("opening blob store")?;
    let ctx = Context::background();
    match cli.command {
        Command::Put(args) => cmd_put(&ctx, &deps, &config, args, &cli.format),
        Command::Get(args) => cmd_get(&ctx, &deps, args),
        Command::Rm(args) => cmd_rm(&ctx, &deps, args, &cli.format),
        Command::Url(args) => cmd_url(&ctx, &deps, args, &cli.format),
        Command::Config(_) => cmd_config(&config, &cli.format),
    }
}

fn parse_digest(hex: &str) -> anyhow::Result<Digest> {
    Digest::from_hex(hex).with_context(|| format!("invalid digest {hex:?}"))
}

/// Digest and checksum of a file, streamed.
fn claims_for(path: &Path) -> anyhow::Result<(Digest, Checksum)> {
    let mut file = BufReader::new(
        File::open(path).with_context(|| format!("opening {}", path.display()))?,
    );
    let mut digest = DigestWriter::new();
    let mut crc = crc32fast::Hasher::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        digest.update(&buf[..n]);
        crc.update(&buf[..n]);
    }
    Ok((digest.finalize(), Checksum::new(crc.finalize())))
}

fn cmd_put(
    ctx: &Context,
    deps: &Dependencies,
    config: &CliConfig,
    args: PutArgs,
    format: &OutputFormat,
) -> anyhow::Result<()> {
    let (claimed, checksum) = match (&args.digest, args.checksum) {
        (Some(hex), Some(checksum)) => (parse_digest(hex)?, Checksum::new(checksum)),
        (digest, checksum) => {
            let (computed, crc) = claims_for(&args.path)?;
            let claimed = match digest {
                Some(hex) => parse_digest(hex)?,
                None => computed,
            };
            (claimed, checksum.map(Checksum::new).unwrap_or(crc))
        }
    };

    let file = File::open(&args.path).with_context(|| format!("opening {}", args.path.display()))?;
    let incoming = IncomingBlob::new(claimed, checksum, BufReader::new(file));
    let outcome = ingest_with_config(ctx, deps, &config.ingest, incoming)
        .with_context(|| format!("uploading {}", args.path.display()))?;

    match format {
        OutputFormat::Json => {
            let value = match &outcome {
                IngestOutcome::Stored(desc) => json!({ "status": "stored", "blob": desc }),
                IngestOutcome::AlreadyPresent(digest) => {
                    json!({ "status": "already_present", "digest": digest })
                }
            };
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        OutputFormat::Text => match &outcome {
            IngestOutcome::Stored(desc) => {
                println!("{} Stored {}", "✓".green().bold(), desc.digest.to_string().yellow());
                println!("  Size: {} bytes", desc.size);
                println!("  Type: {}", desc.mime().unwrap_or("unknown").cyan());
            }
            IngestOutcome::AlreadyPresent(digest) => {
                println!("{} Already stored {}", "•".blue(), digest.to_string().yellow());
            }
        },
    }
    Ok(())
}

fn cmd_get(ctx: &Context, deps: &Dependencies, args: GetArgs) -> anyhow::Result<()> {
    let digest = parse_digest(&args.digest)?;
    match deps.storage.locate(ctx, &digest)? {
        BlobLocation::Url(url) => println!("{url}"),
        BlobLocation::Stream(mut reader) => match &args.output {
            Some(path) => {
                let mut out = File::create(path)
                    .with_context(|| format!("creating {}", path.display()))?;
                io::copy(&mut reader, &mut out)?;
            }
            None => {
                io::copy(&mut reader, &mut io::stdout().lock())?;
            }
        },
    }
    Ok(())
}

fn cmd_rm(
    ctx: &Context,
    deps: &Dependencies,
    args: RmArgs,
    format: &OutputFormat,
) -> anyhow::Result<()> {
    let digest = parse_digest(&args.digest)?;
    deps.storage.delete(ctx, &digest)?;
    match format {
        OutputFormat::Json => println!("{}", json!({ "deleted": digest })),
        OutputFormat::Text => println!("{} Deleted {}", "✓".green().bold(), digest.to_string().yellow()),
    }
    Ok(())
}

fn cmd_url(
    ctx: &Context,
    deps: &Dependencies,
    args: UrlArgs,
    format: &OutputFormat,
) -> anyhow::Result<()> {
    let digest = parse_digest(&args.digest)?;
    let url = deps.storage.build_public_url(ctx, &digest)?;
    match (format, url) {
        (OutputFormat::Json, url) => println!("{}", json!({ "digest": digest, "url": url })),
        (OutputFormat::Text, Some(url)) => println!("{url}"),
        (OutputFormat::Text, None) => println!(
            "No public URL: the {} store serves blobs directly.",
            deps.storage.backend_name().bold()
        ),
    }
    Ok(())
}

fn cmd_config(config: &CliConfig, format: &OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(config)?),
        OutputFormat::Text => print!("{}", toml::to_string_pretty(config)?),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn run(root: &Path, args: &[&str]) -> anyhow::Result<()> {
        let mut argv = vec!["blobs", "--root", root.to_str().unwrap()];
        argv.extend_from_slice(args);
        run_command(Cli::try_parse_from(argv).unwrap())
    }

    #[test]
    fn put_get_rm() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("store");
        let input = dir.path().join("in.gif");
        let data = b"GIF89a pretend image bytes".to_vec();
        std::fs::write(&input, &data).unwrap();
        let digest = Digest::of(&data).to_hex();

        run(&root, &["put", input.to_str().unwrap()]).unwrap();
        assert!(root.join(&digest).is_file());

        // A second upload is a no-op, not an error.
        run(&root, &["--format", "json", "put", input.to_str().unwrap()]).unwrap();

        let output = dir.path().join("out.gif");
        run(&root, &["get", digest.as_str(), "-o", output.to_str().unwrap()]).unwrap();
        assert_eq!(std::fs::read(&output).unwrap(), data);

        run(&root, &["rm", digest.as_str()]).unwrap();
        run(&root, &["rm", digest.as_str()]).unwrap();
        assert!(run(&root, &["get", digest.as_str()]).is_err());
    }

    #[test]
    fn put_with_wrong_digest_fails_and_stores_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("store");
        let input = dir.path().join("in.bin");
        std::fs::write(&input, b"actual").unwrap();
        let wrong = Digest::of(b"claimed").to_hex();

        let err = run(&root, &["put", input.to_str().unwrap(), "--digest", wrong.as_str()]).unwrap_err();
        assert!(format!("{err:#}").contains("did not match"));
        assert!(!root.join(&wrong).exists());
    }

    #[test]
    fn claims_for_matches_in_memory_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        std::fs::write(&path, b"123456789").unwrap();
        let (digest, checksum) = claims_for(&path).unwrap();
        assert_eq!(digest, Digest::of(b"123456789"));
        assert_eq!(checksum, Checksum::of(b"123456789"));
    }

    #[test]
    fn rejects_malformed_digest() {
        let dir = tempfile::tempdir().unwrap();
        assert!(run(dir.path(), &["rm", "not-hex"]).is_err());
    }

    #[test]
    fn url_and_config_commands() {
        let dir = tempfile::tempdir().unwrap();
        let digest = Digest::of(b"x").to_hex();
        run(dir.path(), &["url", digest.as_str()]).unwrap();
        run(dir.path(), &["config"]).unwrap();
        run(dir.path(), &["--format", "json", "config"]).unwrap();
    }
}
