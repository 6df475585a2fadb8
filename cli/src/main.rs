// Copyright 2024 Kevin Ludwig
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::{fs::File, path::PathBuf, process::ExitCode};

use clap::Parser;
use f32defrag_core::Volume;
use f32defrag_ds_std::BlockDeviceFile;
use f32defrag_err::Result;
use log::debug;

/// Defragments a FAT32 disk image in place.
#[derive(Parser)]
#[command(name = "f32defrag", version, about)]
struct Args {
    /// Path to the FAT32 disk image.
    image: PathBuf,

    /// Redirect normal output to the given path.
    #[arg(short = 'l', long = "log_file", value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Verbose / debug trace.
    #[arg(short = 'x', long = "xmode")]
    xmode: bool,

    /// Analyze only; skip defragmentation.
    #[arg(short, long)]
    analyze: bool,
}

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            let _ = err.print();
            return if err.exit_code() == 0 {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            };
        }
    };

    let mut builder = env_logger::Builder::new();
    builder.filter_level(if args.xmode {
        log::LevelFilter::Trace
    } else {
        log::LevelFilter::Info
    });
    if let Some(path) = &args.log_file {
        match File::create(path) {
            Ok(file) => {
                builder.target(env_logger::Target::Pipe(Box::new(file)));
            }
            Err(err) => {
                eprintln!("ERROR: cannot open log file {}: {err}", path.display());
                return ExitCode::FAILURE;
            }
        }
    }
    builder.init();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("ERROR: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<()> {
    let device = BlockDeviceFile::mount(&args.image)?;
    let mut volume = Volume::mount(device)?;

    if args.analyze {
        let report = f32defrag_core::analyze(&mut volume)?;
        println!("fragmentation: {:.2}%", report.fragmentation_percent);
    } else {
        let mut touched: u64 = 0;
        let report = f32defrag_core::defragment(&mut volume, |n| touched += n)?;
        debug!("clusters touched: {touched}");
        println!("fragmentation: {:.2}%", report.fragmentation_percent);
    }

    Ok(())
}
