// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Flag a simulated observation and compare the flags with the injected RFI.


use std::{
    fs::File,
    io::{BufWriter, Write},
    path::PathBuf,
    sync::Arc,
};

use clap::Parser;
use itertools::Itertools;
use log::{debug, info, trace};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{
    common::{display_warnings, InfoPrinter, Warn, ARG_FILE_HELP},
    progress::ProgressBarListener,
    strategy_file::{read_strategy_file, StrategyFileError},
    HyperflagError,
};
use crate::{
    data::{GridError, Mask2D, Polarisation},
    simulate::{simulate_baseline, SimulationParams},
    strategy::{
        default_strategy, Action, ActionType, ArtifactSet, BaselineData, BaselineSource,
        MemoryBaselineSet, Strategy, StrategyError,
    },
};

const DEFAULT_NUM_BASELINES: usize = 4;
const DEFAULT_SEED: u64 = 42;

lazy_static::lazy_static! {
    static ref DEFAULT_SIM: SimulationParams = SimulationParams::default();

    static ref NUM_TIMESTEPS_HELP: String =
        format!("The number of timesteps of each baseline. Default: {}", DEFAULT_SIM.width);

    static ref NUM_CHANNELS_HELP: String =
        format!("The number of channels of each baseline. Default: {}", DEFAULT_SIM.height);

    static ref NUM_BASELINES_HELP: String =
        format!("The number of baselines to simulate. Default: {DEFAULT_NUM_BASELINES}");

    static ref POLARISATIONS_HELP: String =
        format!("The polarisations to simulate. Default: {}", DEFAULT_SIM.polarisations.iter().join(" "));

    static ref NOISE_SIGMA_HELP: String =
        format!("The standard deviation of the real and imaginary noise. Default: {}", DEFAULT_SIM.noise_sigma);

    static ref NUM_BURSTS_HELP: String =
        format!("The number of broadband bursts injected into each baseline. Default: {}", DEFAULT_SIM.num_bursts);

    static ref NUM_LINES_HELP: String =
        format!("The number of narrowband lines injected into each baseline. Default: {}", DEFAULT_SIM.num_lines);

    static ref RFI_AMPLITUDE_HELP: String =
        format!("The amplitude of the injected RFI, in units of the noise sigma. Default: {}", DEFAULT_SIM.rfi_amplitude);

    static ref SEED_HELP: String =
        format!("The random seed. The same seed always simulates the same data. Default: {DEFAULT_SEED}");
}

#[derive(Parser, Debug, Clone, Default, Serialize, Deserialize)]
pub(super) struct FlagSimulatedArgs {
    #[clap(name = "ARGUMENTS_FILE", help = ARG_FILE_HELP.as_str(), parse(from_os_str))]
    pub(super) args_file: Option<PathBuf>,

    /// The strategy file to flag with. If not given, the default strategy is
    /// used.
    #[clap(short, long, parse(from_os_str), help_heading = "STRATEGY")]
    pub(super) strategy: Option<PathBuf>,

    /// The number of threads used to flag baselines. The default is one per
    /// CPU core.
    #[clap(long, help_heading = "STRATEGY")]
    pub(super) threads: Option<usize>,

    #[clap(long, help = NUM_TIMESTEPS_HELP.as_str(), help_heading = "SIMULATION")]
    pub(super) num_timesteps: Option<usize>,

    #[clap(long, help = NUM_CHANNELS_HELP.as_str(), help_heading = "SIMULATION")]
    pub(super) num_channels: Option<usize>,

    #[clap(long, help = NUM_BASELINES_HELP.as_str(), help_heading = "SIMULATION")]
    pub(super) num_baselines: Option<usize>,

    #[clap(long, multiple_values(true), help = POLARISATIONS_HELP.as_str(), help_heading = "SIMULATION")]
    pub(super) polarisations: Option<Vec<Polarisation>>,

    #[clap(long, help = NOISE_SIGMA_HELP.as_str(), help_heading = "SIMULATION")]
    pub(super) noise_sigma: Option<f64>,

    #[clap(long, help = NUM_BURSTS_HELP.as_str(), help_heading = "SIMULATION")]
    pub(super) num_bursts: Option<usize>,

    #[clap(long, help = NUM_LINES_HELP.as_str(), help_heading = "SIMULATION")]
    pub(super) num_lines: Option<usize>,

    #[clap(long, help = RFI_AMPLITUDE_HELP.as_str(), help_heading = "SIMULATION")]
    pub(super) rfi_amplitude: Option<f64>,

    #[clap(long, help = SEED_HELP.as_str(), help_heading = "SIMULATION")]
    pub(super) seed: Option<u64>,

    /// Write the flags of every baseline to this JSON file.
    #[clap(short, long, parse(from_os_str), help_heading = "OUTPUT")]
    pub(super) output: Option<PathBuf>,
}

impl FlagSimulatedArgs {
    /// Both command-line and file arguments overlap in terms of what is
    /// available; this function consolidates everything that was specified
    /// into a single struct. Where applicable, it will prefer CLI parameters
    /// over those in the file.
    pub(super) fn merge(self) -> Result<FlagSimulatedArgs, HyperflagError> {
        debug!("Merging command-line arguments with the argument file");

        let cli_args = self;

        if let Some(arg_file) = cli_args.args_file {
            // Ensure all of the file args are accounted for by pattern
            // matching.
            let FlagSimulatedArgs {
                args_file: _,
                strategy,
                threads,
                num_timesteps,
                num_channels,
                num_baselines,
                polarisations,
                noise_sigma,
                num_bursts,
                num_lines,
                rfi_amplitude,
                seed,
                output,
            } = unpack_arg_file!(arg_file);

            Ok(FlagSimulatedArgs {
                args_file: None,
                strategy: cli_args.strategy.or(strategy),
                threads: cli_args.threads.or(threads),
                num_timesteps: cli_args.num_timesteps.or(num_timesteps),
                num_channels: cli_args.num_channels.or(num_channels),
                num_baselines: cli_args.num_baselines.or(num_baselines),
                polarisations: cli_args.polarisations.or(polarisations),
                noise_sigma: cli_args.noise_sigma.or(noise_sigma),
                num_bursts: cli_args.num_bursts.or(num_bursts),
                num_lines: cli_args.num_lines.or(num_lines),
                rfi_amplitude: cli_args.rfi_amplitude.or(rfi_amplitude),
                seed: cli_args.seed.or(seed),
                output: cli_args.output.or(output),
            })
        } else {
            Ok(cli_args)
        }
    }

    /// Check the arguments and fill in defaults.
    pub(super) fn parse(self) -> Result<FlagSimulatedParams, FlagSimulatedArgsError> {
        trace!("{:#?}", self);

        let Self {
            args_file: _,
            strategy,
            threads,
            num_timesteps,
            num_channels,
            num_baselines,
            polarisations,
            noise_sigma,
            num_bursts,
            num_lines,
            rfi_amplitude,
            seed,
            output,
        } = self;

        let sim = SimulationParams {
            width: num_timesteps.unwrap_or(DEFAULT_SIM.width),
            height: num_channels.unwrap_or(DEFAULT_SIM.height),
            polarisations: polarisations.unwrap_or_else(|| DEFAULT_SIM.polarisations.clone()),
            noise_sigma: noise_sigma.unwrap_or(DEFAULT_SIM.noise_sigma),
            num_bursts: num_bursts.unwrap_or(DEFAULT_SIM.num_bursts),
            num_lines: num_lines.unwrap_or(DEFAULT_SIM.num_lines),
            rfi_amplitude: rfi_amplitude.unwrap_or(DEFAULT_SIM.rfi_amplitude),
            ..DEFAULT_SIM.clone()
        };
        if sim.width == 0 || sim.height == 0 {
            return Err(FlagSimulatedArgsError::EmptyGrid {
                width: sim.width,
                height: sim.height,
            });
        }
        if sim.polarisations.is_empty() {
            return Err(FlagSimulatedArgsError::NoPolarisations);
        }
        if !(sim.noise_sigma.is_finite() && sim.noise_sigma > 0.0) {
            return Err(FlagSimulatedArgsError::BadNoiseSigma(sim.noise_sigma));
        }
        if !sim.rfi_amplitude.is_finite() {
            return Err(FlagSimulatedArgsError::BadRfiAmplitude(sim.rfi_amplitude));
        }
        if sim.rfi_amplitude < 3.0 && sim.num_bursts + sim.num_lines > 0 {
            format!(
                "RFI with an amplitude of {} sigma will be hard to tell apart from the noise",
                sim.rfi_amplitude
            )
            .warn();
        }

        let num_baselines = num_baselines.unwrap_or(DEFAULT_NUM_BASELINES);
        if num_baselines == 0 {
            return Err(FlagSimulatedArgsError::NoBaselines);
        }
        let threads = threads.unwrap_or(0);
        if threads > num_baselines {
            format!("Only {num_baselines} of the {threads} requested threads will be used").warn();
        }

        if let Some(output) = output.as_ref() {
            let is_json = output
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.eq_ignore_ascii_case("json"))
                .unwrap_or(false);
            if !is_json {
                return Err(FlagSimulatedArgsError::OutputNotJson(output.clone()));
            }
        }

        let strategy = match strategy {
            Some(path) => read_strategy_file(&path)?,
            None => default_strategy(),
        };

        Ok(FlagSimulatedParams {
            sim,
            num_baselines,
            seed: seed.unwrap_or(DEFAULT_SEED),
            threads,
            strategy,
            output,
        })
    }
}

#[derive(Error, Debug)]
pub(super) enum FlagSimulatedArgsError {
    #[error("Can't simulate a {width}x{height} grid; there must be at least one timestep and one channel")]
    EmptyGrid { width: usize, height: usize },

    #[error("At least one polarisation must be simulated")]
    NoPolarisations,

    #[error("At least one baseline must be simulated")]
    NoBaselines,

    #[error("The noise sigma must be positive, but it is {0}")]
    BadNoiseSigma(f64),

    #[error("The RFI amplitude must be finite, but it is {0}")]
    BadRfiAmplitude(f64),

    #[error("Flags can only be written to JSON files, but '{}' was given", .0.display())]
    OutputNotJson(PathBuf),

    #[error(transparent)]
    Strategy(#[from] StrategyFileError),

    #[error(transparent)]
    Grid(#[from] GridError),
}

#[derive(Debug)]
pub(super) struct FlagSimulatedParams {
    pub(super) sim: SimulationParams,
    pub(super) num_baselines: usize,
    pub(super) seed: u64,
    /// 0 means one per CPU core.
    pub(super) threads: usize,
    pub(super) strategy: Strategy,
    pub(super) output: Option<PathBuf>,
}

/// How the flags of one baseline compare with its injected RFI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(super) struct BaselineReport {
    pub(super) index: usize,
    pub(super) description: String,
    /// Did the strategy fail on this baseline? Its flags are then those it
    /// was simulated with (none).
    pub(super) failed: bool,
    pub(super) num_flagged: usize,
    pub(super) num_rfi: usize,
    /// Flagged samples with RFI.
    pub(super) num_detected: usize,
    /// Flagged samples without RFI.
    pub(super) num_false_positives: usize,
    pub(super) flags: Mask2D,
}

impl BaselineReport {
    fn new(
        index: usize,
        description: String,
        failed: bool,
        flags: Mask2D,
        rfi: &Mask2D,
    ) -> Self {
        let (mut num_detected, mut num_false_positives) = (0, 0);
        for (&flag, &truth) in flags.view().iter().zip(rfi.view().iter()) {
            match (flag, truth) {
                (true, true) => num_detected += 1,
                (true, false) => num_false_positives += 1,
                _ => (),
            }
        }
        BaselineReport {
            index,
            description,
            failed,
            num_flagged: flags.count_flagged(),
            num_rfi: rfi.count_flagged(),
            num_detected,
            num_false_positives,
            flags,
        }
    }
}

/// What's written to the output file.
#[derive(Debug, Serialize, Deserialize)]
pub(super) struct FlagSimulatedOutput {
    pub(super) strategy: String,
    pub(super) width: usize,
    pub(super) height: usize,
    pub(super) baselines: Vec<BaselineReport>,
}

impl FlagSimulatedParams {
    fn display(&self) {
        let mut printer = InfoPrinter::new("Simulation".into());
        printer.push_block(vec![
            format!(
                "{} baselines of {} timesteps and {} channels",
                self.num_baselines, self.sim.width, self.sim.height
            )
            .into(),
            format!(
                "Polarisations: {}",
                self.sim.polarisations.iter().join(", ")
            )
            .into(),
        ]);
        printer.push_line(
            format!(
                "Noise sigma {}; {} bursts and {} lines of {} sigma per baseline",
                self.sim.noise_sigma, self.sim.num_bursts, self.sim.num_lines, self.sim.rfi_amplitude
            )
            .into(),
        );
        printer.push_line(format!("Seed: {}", self.seed).into());
        printer.display();

        let mut printer = InfoPrinter::new("Strategy".into());
        printer.push_line(
            format!(
                "'{}' ({} actions)",
                self.strategy.name,
                self.strategy.root.count()
            )
            .into(),
        );
        printer.push_line(
            match self.threads {
                0 => "One thread per CPU core".into(),
                n => format!("{n} threads").into(),
            },
        );
        if let Some(output) = self.output.as_ref() {
            printer.push_line(format!("Writing flags to {}", output.display()).into());
        }
        printer.display();
    }

    /// The action run over all of the baselines. A strategy that already
    /// iterates over baselines is used as is.
    fn root_action(&self) -> Action {
        if self.strategy.root.action_type() == ActionType::ForEachBaseline {
            self.strategy.root.clone()
        } else {
            Action::ForEachBaseline {
                threads: self.threads,
                children: vec![self.strategy.root.clone()],
            }
        }
    }

    pub(super) fn run(&self, dry_run: bool) -> Result<FlagSimulatedOutput, HyperflagError> {
        self.display();
        display_warnings();
        if dry_run {
            info!("Dry run -- exiting now.");
            return Ok(FlagSimulatedOutput {
                strategy: self.strategy.name.clone(),
                width: self.sim.width,
                height: self.sim.height,
                baselines: vec![],
            });
        }

        info!("Simulating {} baselines", self.num_baselines);
        let mut baselines = Vec::with_capacity(self.num_baselines);
        let mut injected = Vec::with_capacity(self.num_baselines);
        for i in 0..self.num_baselines {
            let sim = simulate_baseline(&self.sim, i, self.seed)?;
            baselines.push(BaselineData {
                data: sim.data,
                metadata: sim.metadata,
            });
            injected.push(sim.rfi);
        }
        let descriptions: Vec<String> = baselines
            .iter()
            .enumerate()
            .map(|(i, b)| {
                b.metadata
                    .baseline_description()
                    .unwrap_or_else(|| format!("baseline {i}"))
            })
            .collect();

        let source = Arc::new(MemoryBaselineSet::new(baselines));
        let mut artifacts = ArtifactSet::from_baselines(source.clone());
        let listener = ProgressBarListener::new("Flagging baselines");
        info!("Flagging with strategy '{}'", self.strategy.name);
        let result = self.root_action().perform(&mut artifacts, &listener);
        listener.finish();
        let failures = match result {
            Ok(()) => vec![],
            Err(StrategyError::BaselineFailures { failures, .. }) => failures,
            Err(e) => return Err(e.into()),
        };

        let mut reports = Vec::with_capacity(self.num_baselines);
        let baselines = descriptions.into_iter().zip(injected.iter()).enumerate();
        for (i, (description, rfi)) in baselines {
            let flags = source
                .load(i)
                .map_err(StrategyError::from)?
                .data
                .get_single_mask();
            let failed = failures.iter().any(|f| f.index == i);
            reports.push(BaselineReport::new(i, description, failed, flags, rfi));
        }
        let output = FlagSimulatedOutput {
            strategy: self.strategy.name.clone(),
            width: self.sim.width,
            height: self.sim.height,
            baselines: reports,
        };
        debug!("{} exceptions were reported", listener.num_exceptions());
        display_results(&output);

        if let Some(path) = self.output.as_ref() {
            let mut f = BufWriter::new(File::create(path)?);
            serde_json::to_writer(&mut f, &output)?;
            f.flush()?;
            info!("Wrote flags to {}", path.display());
        }

        Ok(output)
    }
}

fn display_results(output: &FlagSimulatedOutput) {
    let sum = |f: fn(&BaselineReport) -> usize| output.baselines.iter().map(f).sum::<usize>();
    let num_samples = output.width * output.height * output.baselines.len();
    let num_rfi = sum(|b| b.num_rfi);
    let num_clean = num_samples - num_rfi;
    let percent = |n: usize, total: usize| {
        if total == 0 {
            0.0
        } else {
            100.0 * n as f64 / total as f64
        }
    };

    let mut printer = InfoPrinter::new("Results".into());
    printer.push_line(
        format!(
            "Flagged {:.2}% of {num_samples} samples",
            percent(sum(|b| b.num_flagged), num_samples)
        )
        .into(),
    );
    printer.push_block(vec![
        format!(
            "Detected {:.2}% of {num_rfi} samples with RFI",
            percent(sum(|b| b.num_detected), num_rfi)
        )
        .into(),
        format!(
            "Flagged {:.2}% of {num_clean} samples without RFI",
            percent(sum(|b| b.num_false_positives), num_clean)
        )
        .into(),
    ]);
    let failed = output.baselines.iter().filter(|b| b.failed).collect::<Vec<_>>();
    if !failed.is_empty() {
        printer.push_line(
            format!(
                "{} of {} baselines failed: {}",
                failed.len(),
                output.baselines.len(),
                failed.iter().map(|b| &b.description).join(", ")
            )
            .into(),
        );
    }
    printer.display();
}
