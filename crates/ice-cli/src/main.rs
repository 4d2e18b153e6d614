use std::env;
use std::path::PathBuf;

use tracing::info;
use tracing_subscriber::EnvFilter;

use ice_core::config::StackConfig;
use ice_core::{StackDescription, StackElementKind, ThermalData, ThermalOptions};

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn print_help() {
    println!(
        r#"ice-cli: transient thermal simulation of 3D stacked chips

USAGE:
    ice-cli <STACK> [OPTIONS]

ARGS:
    <STACK>                  Stack description (JSON)

OPTIONS:
    -h, --help               Print help information
    -V, --version            Print version information
    -t, --time <SECONDS>     Simulated time (default: one time step)
    --slot <SECONDS>         Report temperatures every SECONDS (default: at the end)
    --step <SECONDS>         Time step of the implicit integration
    --initial <KELVIN>       Initial temperature of every cell
    -p, --power <DIE:ELEMENT=WATTS>
                             Power of one floorplan element, repeatable
    --flow-rate <ML/MIN>     Coolant flow rate
    --storage <csc|csr>      System matrix layout
    --solver <auto|dense|faer>
                             Linear solver backend
    --set <NAME=VALUE>       Set any simulator option, repeatable
    --list-options           List simulator options and exit
    --print-stack            Print the stack layout before simulating
    --dump <DIR>             Write matrix and source dumps after the last step
    --precision <N>          Digits in dumps (1-15, default: 6)

ENVIRONMENT:
    RUST_LOG                 Log filter, e.g. RUST_LOG=ice_core=debug

EXAMPLES:
    ice-cli demos/two_die.json -t 0.1
    ice-cli demos/two_die.json -t 1 --slot 0.1 -p core:cpu0=2.5 --flow-rate 2.4
    ice-cli demos/two_die.json --storage csr --dump out/"#
    );
}

fn print_version() {
    println!("ice-cli {}", VERSION);
}

fn print_options() {
    for (name, description) in ThermalOptions::describe() {
        println!("  {:<22}{}", name, description);
    }
}

/// One `--power` assignment.
struct PowerValue {
    die: String,
    element: String,
    watts: f64,
}

fn parse_power(value: &str) -> Option<PowerValue> {
    let (target, watts) = value.split_once('=')?;
    let (die, element) = target.split_once(':')?;
    Some(PowerValue {
        die: die.trim().to_string(),
        element: element.trim().to_string(),
        watts: watts.trim().parse().ok()?,
    })
}

struct Run {
    stack_path: PathBuf,
    total_time: Option<f64>,
    slot_time: Option<f64>,
    powers: Vec<PowerValue>,
    flow_rate: Option<f64>,
    options: ThermalOptions,
    print_stack: bool,
    dump_dir: Option<PathBuf>,
}

fn next_value(args: &mut impl Iterator<Item = String>, flag: &str) -> String {
    let Some(value) = args.next() else {
        eprintln!("missing value for {}", flag);
        std::process::exit(2);
    };
    value
}

fn parse_seconds(value: &str, flag: &str) -> f64 {
    match value.parse::<f64>() {
        Ok(v) if v > 0.0 && v.is_finite() => v,
        _ => {
            eprintln!("{} expects a positive number of seconds, got '{}'", flag, value);
            std::process::exit(2);
        }
    }
}

fn set_option(options: &mut ThermalOptions, name: &str, value: &str) {
    if !options.set(name, value) {
        eprintln!("invalid value '{}' for option {}", value, name);
        std::process::exit(2);
    }
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut args = env::args().skip(1);
    let mut stack_path: Option<PathBuf> = None;
    let mut total_time: Option<f64> = None;
    let mut slot_time: Option<f64> = None;
    let mut powers = Vec::new();
    let mut flow_rate: Option<f64> = None;
    let mut options = ThermalOptions::new();
    let mut print_stack = false;
    let mut dump_dir: Option<PathBuf> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                print_version();
                std::process::exit(0);
            }
            "--list-options" => {
                print_options();
                std::process::exit(0);
            }
            "--time" | "-t" => {
                let value = next_value(&mut args, &arg);
                total_time = Some(parse_seconds(&value, &arg));
            }
            "--slot" => {
                let value = next_value(&mut args, &arg);
                slot_time = Some(parse_seconds(&value, &arg));
            }
            "--step" => {
                let value = next_value(&mut args, &arg);
                set_option(&mut options, "delta_time", &value);
            }
            "--initial" => {
                let value = next_value(&mut args, &arg);
                set_option(&mut options, "initial_temperature", &value);
            }
            "--storage" | "--solver" | "--precision" => {
                let value = next_value(&mut args, &arg);
                let name = match arg.as_str() {
                    "--precision" => "dump_precision",
                    other => other.trim_start_matches("--"),
                };
                set_option(&mut options, name, &value);
            }
            "--set" => {
                let value = next_value(&mut args, &arg);
                let Some((name, raw)) = value.split_once('=') else {
                    eprintln!("--set expects NAME=VALUE, got '{}'", value);
                    std::process::exit(2);
                };
                set_option(&mut options, name.trim(), raw);
            }
            "--power" | "-p" => {
                let value = next_value(&mut args, &arg);
                let Some(power) = parse_power(&value) else {
                    eprintln!("--power expects DIE:ELEMENT=WATTS, got '{}'", value);
                    std::process::exit(2);
                };
                powers.push(power);
            }
            "--flow-rate" => {
                let value = next_value(&mut args, &arg);
                flow_rate = match value.parse::<f64>() {
                    Ok(v) if v >= 0.0 && v.is_finite() => Some(v),
                    _ => {
                        eprintln!("--flow-rate expects a non-negative number, got '{}'", value);
                        std::process::exit(2);
                    }
                };
            }
            "--print-stack" => print_stack = true,
            "--dump" => {
                dump_dir = Some(PathBuf::from(next_value(&mut args, &arg)));
            }
            _ => {
                if arg.starts_with('-') {
                    eprintln!("unknown option: {}", arg);
                    std::process::exit(2);
                }
                if stack_path.is_some() {
                    eprintln!("unexpected argument: {}", arg);
                    std::process::exit(2);
                }
                stack_path = Some(PathBuf::from(arg));
            }
        }
    }

    let Some(stack_path) = stack_path else {
        eprintln!("usage: ice-cli <stack.json> [--time <seconds>]");
        std::process::exit(2);
    };
    if !stack_path.exists() {
        eprintln!("stack description not found: {}", stack_path.display());
        std::process::exit(2);
    }

    let run = Run {
        stack_path,
        total_time,
        slot_time,
        powers,
        flow_rate,
        options,
        print_stack,
        dump_dir,
    };
    if let Err(err) = simulate(&run) {
        eprintln!("error ({}): {}", err.code(), err);
        std::process::exit(1);
    }
}

fn simulate(run: &Run) -> ice_core::Result<()> {
    run.options.log_user_options();
    let config = run.options.to_config();

    let mut stack = StackConfig::from_json_file(&run.stack_path)?.build()?;
    for power in &run.powers {
        stack.insert_power_value(&power.die, &power.element, power.watts)?;
    }
    if let Some(flow_rate) = run.flow_rate {
        stack.set_flow_rate(flow_rate)?;
    }
    if run.print_stack {
        println!("{}", stack);
    }

    let mut tdata = ThermalData::new(&stack, config)?;
    tdata.fill(&mut stack)?;

    let total = run.total_time.unwrap_or(config.delta_time);
    let slot = run.slot_time.unwrap_or(total).min(total);
    let mut elapsed = 0.0;
    while elapsed < total - 1e-12 {
        let span = slot.min(total - elapsed);
        let steps = tdata.solve(span)?;
        elapsed += steps as f64 * config.delta_time;
        report(&tdata, &stack)?;
    }

    let stats = tdata.stats();
    info!(
        steps = stats.steps,
        rebuilds = stats.full_rebuilds,
        factorizations = tdata.factor_count(),
        solver = tdata.solver_name(),
        "simulation finished"
    );

    if let Some(dir) = &run.dump_dir {
        tdata.dump_to_dir(dir, run.options.dump_precision())?;
        println!("dump written: {}", dir.display());
    }
    Ok(())
}

/// Print the temperature of every floorplan element and channel outlet.
fn report(tdata: &ThermalData, stack: &StackDescription) -> ice_core::Result<()> {
    println!("time {:.6} s", tdata.time());
    for element in stack.elements() {
        match &element.kind {
            StackElementKind::Die(die) => {
                for fe in die.floorplan.elements() {
                    let t = tdata.min_avg_max_temperatures_of_floorplan_element(stack, &element.id, &fe.id)?;
                    println!(
                        "  {}:{:<16} min {:>9.3} K  avg {:>9.3} K  max {:>9.3} K",
                        element.id, fe.id, t.min, t.avg, t.max
                    );
                }
            }
            StackElementKind::Channel => {
                let outlets = tdata.dimensions().n_columns() / 2;
                for outlet in 0..outlets {
                    let t = tdata.temperature_of_channel_outlet(stack, &element.id, outlet)?;
                    println!("  {}:outlet{:<10} {:>9.3} K", element.id, outlet, t);
                }
            }
            StackElementKind::Layer(_) => {}
        }
    }
    Ok(())
}
