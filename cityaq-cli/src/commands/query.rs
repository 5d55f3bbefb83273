//! One-shot queries printed to stdout.

use clap::Args;
use cityaq::colormap::LegendEntry;
use cityaq::config::ConfigFile;
use cityaq::service::{ImpactRequest, PopulationRequest};

use super::common::{EmissionArg, ServiceRunner, SimulationArg};
use crate::error::CliError;

/// City, source type and pollutant of a query.
#[derive(Debug, Args)]
pub struct ImpactArgs {
    /// City name as listed by `cityaq cities`
    #[arg(long, short)]
    pub city: String,

    /// Emission source type, e.g. roadways or electric_gen_egugrid
    #[arg(long, short)]
    pub source: String,

    #[arg(long, short, value_enum, default_value = "pm2.5")]
    pub emission: EmissionArg,

    #[arg(long, value_enum, default_value_t = SimulationArg::CityMarginal)]
    pub simulation: SimulationArg,
}

impl ImpactArgs {
    fn request(&self) -> ImpactRequest {
        ImpactRequest {
            city: self.city.clone(),
            emission: self.emission.into(),
            source_type: self.source.clone(),
            simulation_type: self.simulation.into(),
        }
    }
}

pub fn cities(config: &ConfigFile) -> Result<(), CliError> {
    let runner = ServiceRunner::new(config)?;
    let names = runner.block_on(runner.service().cities())?;
    for name in &names {
        println!("{}", name);
    }
    Ok(())
}

pub fn sectors(config: &ConfigFile) -> Result<(), CliError> {
    let runner = ServiceRunner::new(config)?;
    for sector in runner.block_on(runner.service().emissions_inventory_sectors())? {
        println!("{}", sector);
    }
    Ok(())
}

/// Gridded unit emissions, optionally with the colour legend.
pub fn emissions(config: &ConfigFile, args: &ImpactArgs, legend: bool) -> Result<(), CliError> {
    let runner = ServiceRunner::new(config)?;
    let service = runner.service();
    let req = args.request();

    let gridded = runner.block_on(service.gridded_emissions(&req))?;
    print_field("Emissions (kg/s)", gridded.grid.len(), &gridded.emissions);

    if legend {
        let map = runner.block_on(service.emissions_map(&req))?;
        println!();
        print_legend(&map.legend);
    }
    Ok(())
}

pub fn concentrations(config: &ConfigFile, args: &ImpactArgs) -> Result<(), CliError> {
    let runner = ServiceRunner::new(config)?;
    let cancel = runner.cancellation();
    let field = runner.block_on(
        runner
            .service()
            .gridded_concentrations(&args.request(), &cancel),
    )?;
    print_field("Concentrations (μg/m³)", field.grid.len(), &field.values);
    Ok(())
}

pub fn population(config: &ConfigFile, args: &ImpactArgs) -> Result<(), CliError> {
    let runner = ServiceRunner::new(config)?;
    let cancel = runner.cancellation();
    let req = PopulationRequest {
        city: args.city.clone(),
        source_type: args.source.clone(),
        simulation_type: args.simulation.into(),
    };
    let field = runner.block_on(runner.service().gridded_population(&req, &cancel))?;
    print_field("Population", field.grid.len(), &field.values);
    Ok(())
}

pub fn impacts(config: &ConfigFile, args: &ImpactArgs) -> Result<(), CliError> {
    let req = args.request();
    let runner = ServiceRunner::new(config)?;
    let cancel = runner.cancellation();
    let summary = runner.block_on(runner.service().impact_summary(&req, &cancel))?;

    println!("Impacts of {} {} in {}", req.source_type, req.emission, req.city);
    println!("                    city          total");
    println!(
        "  population  {:>12.4e}  {:>12.4e}",
        summary.city_population, summary.population
    );
    println!(
        "  exposure    {:>12.4e}  {:>12.4e}",
        summary.city_exposure, summary.total_exposure
    );
    println!(
        "  iF          {:>12.4e}  {:>12.4e}",
        summary.city_intake_fraction, summary.total_intake_fraction
    );
    Ok(())
}

fn print_field(label: &str, cells: usize, values: &[f64]) {
    let nonzero = values.iter().filter(|&&v| v != 0.0).count();
    let total: f64 = values.iter().sum();
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    println!("{}", label);
    println!("  cells:    {}", cells);
    println!("  non-zero: {}", nonzero);
    println!("  total:    {:.6e}", total);
    if cells > 0 {
        println!("  max:      {:.6e}", max);
    }
}

fn print_legend(legend: &[LegendEntry]) {
    println!("Legend");
    for entry in legend {
        let [r, g, b] = entry.color.to_array();
        println!("  {:>12.4e}  #{:02x}{:02x}{:02x}", entry.value, r, g, b);
    }
}
