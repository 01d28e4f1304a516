use color_eyre::eyre::eyre;
use listener_xword::bench::read_json_or_default;
use listener_xword::debug::StatsSummary;

// Prints `right - left` for two StatsSummary dumps.
pub fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let args = std::env::args().collect::<Vec<_>>();
    let [_, left, right] = args.as_slice() else {
        return Err(eyre!("Usage: diff-stat left.json right.json"));
    };
    let left: StatsSummary = read_json_or_default(left)?;
    let right: StatsSummary = read_json_or_default(right)?;
    println!("{}", serde_json::to_string_pretty(&right.delta_from(&left))?);
    Ok(())
}
