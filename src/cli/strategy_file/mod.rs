// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Reading, writing and printing strategy files.


use std::{
    borrow::Cow,
    fs::File,
    io::{BufWriter, Read, Write},
    path::{Path, PathBuf},
    str::FromStr,
};

use clap::Parser;
use itertools::Itertools;
use log::{debug, info};
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString};
use thiserror::Error;

use super::{common::InfoPrinter, HyperflagError};
use crate::strategy::{default_strategy, Action, Strategy};

lazy_static::lazy_static! {
    static ref STRATEGY_FILE_TYPES_COMMA_SEPARATED: String = StrategyFileType::iter().join(", ");

    static ref STRATEGY_FILE_HELP: String =
        format!("The path to the strategy file. Supported formats: {}", *STRATEGY_FILE_TYPES_COMMA_SEPARATED);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter, EnumString)]
pub(super) enum StrategyFileType {
    #[strum(serialize = "toml")]
    Toml,
    #[strum(serialize = "json")]
    Json,
    #[strum(serialize = "yaml", serialize = "yml")]
    Yaml,
}

impl StrategyFileType {
    fn from_path(path: &Path) -> Result<StrategyFileType, StrategyFileError> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(|e| StrategyFileType::from_str(&e.to_lowercase()).ok())
            .ok_or_else(|| StrategyFileError::UnknownExtension {
                path: path.to_path_buf(),
                valid: STRATEGY_FILE_TYPES_COMMA_SEPARATED.as_str(),
            })
    }
}

#[derive(Error, Debug)]
pub(super) enum StrategyFileError {
    #[error("Strategy file '{}' doesn't have a recognised file extension! Valid extensions are: {valid}", path.display())]
    UnknownExtension { path: PathBuf, valid: &'static str },

    #[error("Couldn't decode {file_type} strategy from '{}':\n{err}", path.display())]
    Decode {
        path: PathBuf,
        file_type: StrategyFileType,
        err: String,
    },

    #[error("Couldn't encode the strategy as {file_type}: {err}")]
    Encode {
        file_type: StrategyFileType,
        err: String,
    },

    #[error(transparent)]
    IO(#[from] std::io::Error),
}

/// Read a strategy from a toml, json or yaml file, chosen by the file's
/// extension.
pub(super) fn read_strategy_file(path: &Path) -> Result<Strategy, StrategyFileError> {
    let file_type = StrategyFileType::from_path(path)?;
    debug!("Reading {file_type} strategy file {}", path.display());
    let mut contents = String::new();
    File::open(path)?.read_to_string(&mut contents)?;

    let decode_err = |err: String| StrategyFileError::Decode {
        path: path.to_path_buf(),
        file_type,
        err,
    };
    match file_type {
        StrategyFileType::Toml => {
            toml::from_str(&contents).map_err(|e| decode_err(e.to_string()))
        }
        StrategyFileType::Json => {
            serde_json::from_str(&contents).map_err(|e| decode_err(e.to_string()))
        }
        StrategyFileType::Yaml => {
            serde_yaml::from_str(&contents).map_err(|e| decode_err(e.to_string()))
        }
    }
}

/// Write a strategy to a toml, json or yaml file, chosen by the file's
/// extension.
pub(super) fn write_strategy_file(
    path: &Path,
    strategy: &Strategy,
) -> Result<(), StrategyFileError> {
    let file_type = StrategyFileType::from_path(path)?;
    let encode_err = |err: String| StrategyFileError::Encode { file_type, err };
    let contents = match file_type {
        StrategyFileType::Toml => {
            toml::to_string_pretty(strategy).map_err(|e| encode_err(e.to_string()))?
        }
        StrategyFileType::Json => {
            serde_json::to_string_pretty(strategy).map_err(|e| encode_err(e.to_string()))?
        }
        StrategyFileType::Yaml => {
            serde_yaml::to_string(strategy).map_err(|e| encode_err(e.to_string()))?
        }
    };
    let mut f = BufWriter::new(File::create(path)?);
    f.write_all(contents.as_bytes())?;
    f.flush()?;
    Ok(())
}

/// One line per action of the tree rooted at `action`, indented by depth.
/// Leaves show their parameters.
pub(super) fn describe_actions(action: &Action) -> Vec<Cow<'static, str>> {
    fn describe(action: &Action, depth: usize, lines: &mut Vec<Cow<'static, str>>) {
        let params = match serde_json::to_value(action) {
            Ok(serde_json::Value::Object(map)) => map
                .into_iter()
                .filter(|(k, _)| k != "type" && k != "children")
                .map(|(k, v)| format!("{k}={v}"))
                .join(", "),
            _ => String::new(),
        };
        let indent = "  ".repeat(depth);
        lines.push(if params.is_empty() {
            format!("{indent}{}", action.action_type()).into()
        } else {
            format!("{indent}{} ({params})", action.action_type()).into()
        });
        for child in action.children() {
            describe(child, depth + 1, lines);
        }
    }

    let mut lines = vec![];
    describe(action, 0, &mut lines);
    lines
}

#[derive(Parser, Debug, Clone)]
pub(super) struct StrategyWriteArgs {
    #[clap(name = "STRATEGY_FILE", help = STRATEGY_FILE_HELP.as_str(), parse(from_os_str))]
    pub(super) file: PathBuf,

    /// The name given to the written strategy.
    #[clap(long)]
    pub(super) name: Option<String>,
}

impl StrategyWriteArgs {
    pub(super) fn run(self) -> Result<(), HyperflagError> {
        let mut strategy = default_strategy();
        if let Some(name) = self.name {
            strategy.name = name;
        }
        write_strategy_file(&self.file, &strategy)?;
        info!(
            "Wrote strategy '{}' ({} actions) to {}",
            strategy.name,
            strategy.root.count(),
            self.file.display()
        );
        Ok(())
    }
}

#[derive(Parser, Debug, Clone)]
pub(super) struct StrategyPrintArgs {
    #[clap(name = "STRATEGY_FILE", help = STRATEGY_FILE_HELP.as_str(), parse(from_os_str))]
    pub(super) file: PathBuf,
}

impl StrategyPrintArgs {
    pub(super) fn run(self) -> Result<(), HyperflagError> {
        let strategy = read_strategy_file(&self.file)?;
        let mut printer = InfoPrinter::new(
            format!(
                "Strategy '{}' ({} actions)",
                strategy.name,
                strategy.root.count()
            )
            .into(),
        );
        printer.push_block(describe_actions(&strategy.root));
        printer.display();
        Ok(())
    }
}
