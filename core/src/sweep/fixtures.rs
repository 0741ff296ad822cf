//! Deterministic sweep passes shared by the unit tests.

const PASS_START_HZ: u64 = 2_450_000_000;
const LINE_SPAN_HZ: u64 = 5_000_000;
const BIN_WIDTH_HZ: u64 = 100_000;
const LINES: u64 = 5;

/// Global bins 80..=120 span 2458.05-2462.05 MHz.
const BURST_BINS: std::ops::RangeInclusive<u64> = 80..=120;
/// Global bins 160..=180 span 2466.05-2468.05 MHz.
const DECOY_BINS: std::ops::RangeInclusive<u64> = 160..=180;
const FLOOR_PATTERN: [f64; 6] = [-90.0, -87.5, -86.0, -88.5, -89.0, -87.0];

/// One 2450-2475 MHz pass at 100 kHz bins. The floor sits near -88 dB and
/// a narrow -70 dB carrier is always present at 2466-2468 MHz. With `burst`
/// a 4 MHz wide signal alternating -60.5/-61.5 dB is added at 2458-2462 MHz.
pub(crate) fn channel_eleven_pass(burst: bool) -> String {
    let bins_per_line = LINE_SPAN_HZ / BIN_WIDTH_HZ;
    let mut out = String::new();
    for line in 0..LINES {
        let low = PASS_START_HZ + line * LINE_SPAN_HZ;
        let powers: Vec<String> = (0..bins_per_line)
            .map(|bin| format!("{:.2}", power_at(line * bins_per_line + bin, burst)))
            .collect();
        out.push_str(&format!(
            "2024-03-02, 14:05:{:02}.000125, {}, {}, {}.00, 20, {}\n",
            line,
            low,
            low + LINE_SPAN_HZ,
            BIN_WIDTH_HZ,
            powers.join(", ")
        ));
    }
    out
}

fn power_at(global_bin: u64, burst: bool) -> f64 {
    if burst && BURST_BINS.contains(&global_bin) {
        if global_bin % 2 == 0 {
            -60.5
        } else {
            -61.5
        }
    } else if DECOY_BINS.contains(&global_bin) {
        -70.0
    } else {
        FLOOR_PATTERN[(global_bin % 6) as usize]
    }
}
