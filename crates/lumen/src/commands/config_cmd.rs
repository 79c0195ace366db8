//! Config subcommand handlers.

use lumen_config::{DeviceProfile, save_config_to};

use crate::cli::{AddDeviceArgs, ConfigArgs, ConfigCommand, GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output;

use super::{config_file, family, load_config};

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let path = config_file(global.config.as_ref());
    match args.command {
        ConfigCommand::Show => {
            let cfg = load_config(global)?;
            let out = match global.output {
                OutputFormat::Table | OutputFormat::Plain => {
                    toml::to_string_pretty(&cfg).map_err(|e| CliError::Config {
                        message: e.to_string(),
                    })?
                }
                format => output::render_single(format, &cfg, |_| String::new(), |_| String::new())?,
            };
            output::print_output(out.trim_end(), global.quiet);
            Ok(())
        }

        ConfigCommand::Path => {
            println!("{}", path.display());
            Ok(())
        }

        ConfigCommand::AddDevice(add) => {
            let mut cfg = load_config(global)?;
            let name = add.name.clone();
            let make_default = add.default;
            cfg.upsert_device(&name, profile_from(add))?;
            if make_default {
                cfg.default_device = Some(name.clone());
            }
            save_config_to(&cfg, &path)?;
            if !global.quiet {
                eprintln!("Saved device '{name}' to {}", path.display());
            }
            Ok(())
        }

        ConfigCommand::RemoveDevice(rm) => {
            let mut cfg = load_config(global)?;
            cfg.remove_device(&rm.name)?;
            save_config_to(&cfg, &path)?;
            if !global.quiet {
                eprintln!("Removed device '{}'", rm.name);
            }
            Ok(())
        }
    }
}

fn profile_from(args: AddDeviceArgs) -> DeviceProfile {
    DeviceProfile {
        address: args.at,
        family: family(args.kind),
        label: args.label,
        baud_rate: args.baud,
        connect_timeout: None,
    }
}
