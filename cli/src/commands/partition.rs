use sweepr_common::config::EngineConfig;
use sweepr_core::partition::TargetPartitioner;

use crate::commands::PartitionArgs;
use crate::terminal::print;

pub fn partition(args: PartitionArgs, config: EngineConfig) -> anyhow::Result<()> {
    let target = args.target.expression()?;
    let profile = &args.target.profile;
    let units = TargetPartitioner::new(config.partition).partition(&target, profile)?;

    print::header("scan units");
    for unit in &units {
        print::tree_head(unit.index, &unit.label());
        print::aligned_line("Id", &unit.id.to_string());
        print::aligned_line("Addresses", &unit.address_count().to_string());
    }
    print::fat_separator();
    let total: u64 = units.iter().map(|u| u.address_count()).sum();
    print::centerln(&format!(
        "{} units, {} addresses, profile {}",
        units.len(),
        total,
        profile
    ));
    Ok(())
}
