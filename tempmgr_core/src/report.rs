//! Operator-facing status line formatting.

use crate::types::{DutyRegs, Targets, Temps};

/// Periodic temperature report, `M105` style:
/// `T:210.0 /210 @:64 B:60.1 /60 B@:25` with `T1:`/`T2:` entries for
/// additional hotends.
pub fn status_line(temps: &Temps, targets: &Targets, duties: &DutyRegs, hotends: usize) -> String {
    let mut line = format!(
        "T:{:.1} /{} @:{}",
        temps.hotend[0], targets.hotend[0], duties.hotend[0]
    );
    for e in 1..hotends {
        line.push_str(&format!(
            " T{e}:{:.1} /{} @{e}:{}",
            temps.hotend[e], targets.hotend[e], duties.hotend[e]
        ));
    }
    line.push_str(&format!(
        " B:{:.1} /{} B@:{}",
        temps.bed, targets.bed, duties.bed
    ));
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_single_hotend() {
        let mut temps = Temps::default();
        temps.hotend[0] = 209.96;
        temps.bed = 60.04;
        let mut targets = Targets::default();
        targets.hotend[0] = 210;
        targets.bed = 60;
        let duties = DutyRegs {
            hotend: [64, 0, 0],
            bed: 25,
        };
        assert_eq!(
            status_line(&temps, &targets, &duties, 1),
            "T:210.0 /210 @:64 B:60.0 /60 B@:25"
        );
    }

    #[test]
    fn extra_hotends_get_indexed_fields() {
        let temps = Temps::default();
        let targets = Targets::default();
        let duties = DutyRegs::default();
        let line = status_line(&temps, &targets, &duties, 3);
        assert!(line.contains(" T1:"));
        assert!(line.contains(" T2:"));
    }
}
