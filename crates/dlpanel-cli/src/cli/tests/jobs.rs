//! Tests for catalog, fetch, batch, install-tool, stop, status, parse-progress.

use super::parse;
use crate::cli::{Cli, CliCommand};
use clap::Parser;
use dlpanel_core::JobKind;
use std::path::PathBuf;

#[test]
fn cli_parse_catalog() {
    match parse(&["dlpanel", "catalog"]) {
        CliCommand::Catalog { dir } => assert!(dir.is_none()),
        _ => panic!("expected Catalog"),
    }
}

#[test]
fn cli_parse_fetch_defaults() {
    match parse(&["dlpanel", "fetch", "https://civitai.com/api/download/models/1"]) {
        CliCommand::Fetch {
            url,
            category,
            filename,
            dest,
            ..
        } => {
            assert_eq!(url, "https://civitai.com/api/download/models/1");
            assert_eq!(category, "lora");
            assert!(filename.is_none());
            assert!(dest.is_none());
        }
        _ => panic!("expected Fetch"),
    }
}

#[test]
fn cli_parse_fetch_options() {
    match parse(&[
        "dlpanel",
        "fetch",
        "https://e.com/x.safetensors",
        "-c",
        "checkpoint",
        "-o",
        "mine",
        "--token",
        "abc",
        "--dest",
        "/tmp/models",
    ]) {
        CliCommand::Fetch {
            category,
            filename,
            token,
            dest,
            ..
        } => {
            assert_eq!(category, "checkpoint");
            assert_eq!(filename.as_deref(), Some("mine"));
            assert_eq!(token.as_deref(), Some("abc"));
            assert_eq!(dest, Some(PathBuf::from("/tmp/models")));
        }
        _ => panic!("expected Fetch"),
    }
}

#[test]
fn cli_parse_batch_keeps_order() {
    match parse(&["dlpanel", "batch", "vae", "flux_dev", "clip"]) {
        CliCommand::Batch { items, .. } => assert_eq!(items, ["vae", "flux_dev", "clip"]),
        _ => panic!("expected Batch"),
    }
}

#[test]
fn cli_parse_batch_requires_items() {
    assert!(Cli::try_parse_from(["dlpanel", "batch"]).is_err());
}

#[test]
fn cli_parse_install_tool() {
    match parse(&["dlpanel", "install-tool", "kohya"]) {
        CliCommand::InstallTool { tool } => assert_eq!(tool, "kohya"),
        _ => panic!("expected InstallTool"),
    }
}

#[test]
fn cli_parse_stop_and_status() {
    match parse(&["dlpanel", "stop", "batch"]) {
        CliCommand::Stop { class } => assert_eq!(class, JobKind::Batch),
        _ => panic!("expected Stop"),
    }
    match parse(&["dlpanel", "status", "tool"]) {
        CliCommand::Status { class } => assert_eq!(class, JobKind::Tool),
        _ => panic!("expected Status"),
    }
    assert!(Cli::try_parse_from(["dlpanel", "stop", "everything"]).is_err());
}

#[test]
fn cli_parse_parse_progress() {
    match parse(&["dlpanel", "parse-progress", "[#1 1B/2B(50%)]", "hello"]) {
        CliCommand::ParseProgress { lines } => assert_eq!(lines.len(), 2),
        _ => panic!("expected ParseProgress"),
    }
}
