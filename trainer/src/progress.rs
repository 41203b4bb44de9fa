use indicatif::{ProgressBar, ProgressStyle};
use ndarray::Array1;

const WIDTH: usize = 11;
const SIGNIFICANT: i32 = 4;
const TEMPLATE: &str = "{msg} {bar:10} {pos}/{len} [{elapsed_precise}<{eta_precise}]";

/// Formats `v` with 4 significant digits the way C's `%.4g` does: fixed
/// notation for moderate exponents, scientific otherwise, trailing zeros
/// removed.
pub fn fmt_g(v: f32) -> String {
    if v.is_nan() {
        return "nan".to_string();
    }

    if v.is_infinite() {
        return if v > 0.0 { "inf" } else { "-inf" }.to_string();
    }

    if v == 0.0 {
        return "0".to_string();
    }

    let sci = format!("{:.*e}", (SIGNIFICANT - 1) as usize, v);
    let Some((mantissa, exp)) = sci.split_once('e') else {
        return sci;
    };
    let exp: i32 = exp.parse().unwrap_or_default();

    if exp < -4 || exp >= SIGNIFICANT {
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{}e{sign}{:02}", strip_zeros(mantissa), exp.abs())
    } else {
        let decimals = (SIGNIFICANT - 1 - exp) as usize;
        strip_zeros(&format!("{v:.decimals$}"))
    }
}

fn strip_zeros(s: &str) -> String {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        s.to_string()
    }
}

/// The column titles printed before every epoch.
pub fn header(loss_names: &[&str]) -> String {
    let mut line = format!("{:>WIDTH$}", "Epoch");
    for name in loss_names {
        line.push_str(&format!("{name:>WIDTH$}"));
    }
    line.push_str(&format!("{:>WIDTH$}{:>WIDTH$}", "Instances", "Size"));
    line
}

/// One progress line: `epoch/epochs`, the running loss components, the label
/// count and the image size of the last batch.
pub fn describe(
    epoch: usize,
    epochs: usize,
    tloss: &Array1<f32>,
    instances: usize,
    img_size: usize,
) -> String {
    let mut line = format!("{:>WIDTH$}", format!("{}/{epochs}", epoch + 1));
    for &l in tloss {
        line.push_str(&format!("{:>WIDTH$}", fmt_g(l)));
    }
    line.push_str(&format!(
        "{:>WIDTH$}{:>WIDTH$}",
        fmt_g(instances as f32),
        fmt_g(img_size as f32)
    ));
    line
}

/// Per-epoch progress bar; draws nothing when not verbose.
pub struct Progress {
    bar: ProgressBar,
}

impl Progress {
    pub fn new(len: usize, verbose: bool) -> Self {
        if !verbose {
            return Self {
                bar: ProgressBar::hidden(),
            };
        }

        let bar = ProgressBar::new(len as u64);
        let style =
            ProgressStyle::with_template(TEMPLATE).unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style);

        Self { bar }
    }

    pub fn println(&self, line: String) {
        self.bar.println(line);
    }

    pub fn advance(&self, description: String) {
        self.bar.set_message(description);
        self.bar.inc(1);
    }

    pub fn finish(&self) {
        self.bar.finish();
    }
}

#[cfg(test)]
mod tests {
    use ndarray::arr1;

    use super::*;

    #[test]
    fn fmt_g_matches_printf() {
        assert_eq!(fmt_g(0.0), "0");
        assert_eq!(fmt_g(0.5), "0.5");
        assert_eq!(fmt_g(640.0), "640");
        assert_eq!(fmt_g(12.0), "12");
        assert_eq!(fmt_g(1.23456), "1.235");
        assert_eq!(fmt_g(0.0001), "0.0001");
        assert_eq!(fmt_g(0.00001234), "1.234e-05");
        assert_eq!(fmt_g(123456.0), "1.235e+05");
        assert_eq!(fmt_g(-2.5), "-2.5");
        assert_eq!(fmt_g(f32::NAN), "nan");
        assert_eq!(fmt_g(f32::INFINITY), "inf");
    }

    #[test]
    fn header_and_description_are_aligned() {
        let names = ["box_loss", "cls_loss", "dfl_loss"];

        let header = header(&names);
        assert_eq!(header.len(), WIDTH * 6);
        assert!(header.starts_with("      Epoch   box_loss"));
        assert!(header.ends_with("  Instances       Size"));

        let line = describe(0, 100, &arr1(&[1.5, 0.25, 2.0]), 37, 640);
        assert_eq!(line.len(), WIDTH * 6);
        assert!(line.starts_with("      1/100        1.5       0.25          2"));
        assert!(line.ends_with("         37        640"));
    }
}
