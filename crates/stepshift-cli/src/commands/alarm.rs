use std::path::Path;

use super::open_store;

pub fn set(data_dir: &Path, name: &str, firing: bool) -> anyhow::Result<()> {
    open_store(data_dir)?.put_alarm(name, firing)?;
    let state = if firing { "ALARM" } else { "OK" };
    println!("✓ {name} is {state}");
    Ok(())
}

pub fn delete(data_dir: &Path, name: &str) -> anyhow::Result<()> {
    if open_store(data_dir)?.delete_alarm(name)? {
        println!("✓ Deleted {name}");
    } else {
        anyhow::bail!("alarm {name} does not exist");
    }
    Ok(())
}

pub fn list(data_dir: &Path) -> anyhow::Result<()> {
    let alarms = open_store(data_dir)?.list_alarms()?;
    if alarms.is_empty() {
        println!("no alarms defined");
    }
    for alarm in alarms {
        let state = if alarm.firing { "ALARM" } else { "OK" };
        println!("{:<5}  {}", state, alarm.name);
    }
    Ok(())
}
