//! Line-scan accumulator for output files
//!
//! One forward pass over an output file feeds every line into [`LineScan`],
//! which recognizes the package's canonical English report phrases and
//! collects the numeric payloads. Both the extractor and the two-tier
//! combiner run the same scan so a file always reads identically.
//!
//! Matching is substring-based with strict numeric parsing of the extracted
//! token; the report phrases are pinned upstream and never localized.

use crate::util::numeric::parse_f64;

/// Default temperature when a file's own temperature line is unparseable.
pub const FALLBACK_TEMPERATURE: f64 = 298.15;

/// Accumulated quantities from a single pass over an output file.
#[derive(Debug, Default, Clone)]
pub struct LineScan {
    /// Every `SCF Done` energy, in order of appearance.
    pub scf_values: Vec<f64>,
    /// TD/CIS total energy, if present.
    pub td_energy: Option<f64>,
    /// PCM-corrected energy, if present.
    pub pcm_energy: Option<f64>,
    /// Zero-point correction.
    pub zpe_correction: Option<f64>,
    /// Thermal correction to Energy.
    pub thermal_energy_correction: Option<f64>,
    /// Thermal correction to Enthalpy.
    pub thermal_enthalpy_correction: Option<f64>,
    /// Thermal correction to Gibbs Free Energy.
    pub thermal_gibbs_correction: Option<f64>,
    /// Sum of electronic and zero-point Energies.
    pub electronic_plus_zpe: Option<f64>,
    /// Sum of electronic and thermal Enthalpies.
    pub electronic_plus_enthalpy: Option<f64>,
    /// Sum of electronic and thermal Free Energies.
    pub electronic_plus_gibbs: Option<f64>,
    /// Nuclear repulsion energy.
    pub nuclear_repulsion: Option<f64>,
    /// Vibrational frequencies, split by sign in order of appearance.
    pub negative_freqs: Vec<f64>,
    pub positive_freqs: Vec<f64>,
    /// Per-file temperature from the Kelvin/Pressure line.
    pub temperature: Option<f64>,
    /// A self-consistent reaction-field directive was seen.
    pub has_scrf: bool,
    /// Header banner occurrences (one per calculation step).
    pub copyright_count: u32,
    pub normal_count: u32,
    pub error_count: u32,
    /// Recoverable parse problems, message only; callers add file context.
    pub warnings: Vec<String>,
}

impl LineScan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one line of the file into the accumulator.
    pub fn feed(&mut self, line: &str, read_temperature: bool) {
        if line.contains("Normal termination") {
            self.normal_count += 1;
        } else if line.contains("Error termination") {
            self.error_count += 1;
        }

        if line.contains("Copyright") {
            self.copyright_count += 1;
        }

        if line.contains("SCF Done") {
            if let Some(value) = first_value_after(line, "=") {
                self.scf_values.push(value);
            }
        } else if line.contains("Total Energy, E(CIS") {
            if let Some(value) = first_value_after(line, "=") {
                self.td_energy = Some(value);
            }
        } else if line.contains("After PCM corrections, the energy is") {
            if let Some(value) = first_value_after(line, "is") {
                self.pcm_energy = Some(value);
            }
        } else if line.contains("Zero-point correction") {
            if let Some(value) = first_value_after(line, "=") {
                self.zpe_correction = Some(value);
            }
        } else if line.contains("Thermal correction to Gibbs Free Energy") {
            if let Some(value) = first_value_after(line, "=") {
                self.thermal_gibbs_correction = Some(value);
            }
        } else if line.contains("Thermal correction to Enthalpy") {
            if let Some(value) = first_value_after(line, "=") {
                self.thermal_enthalpy_correction = Some(value);
            }
        } else if line.contains("Thermal correction to Energy") {
            if let Some(value) = first_value_after(line, "=") {
                self.thermal_energy_correction = Some(value);
            }
        } else if line.contains("Sum of electronic and thermal Free Energies") {
            if let Some(value) = first_value_after(line, "=") {
                self.electronic_plus_gibbs = Some(value);
            }
        } else if line.contains("Sum of electronic and thermal Enthalpies") {
            if let Some(value) = first_value_after(line, "=") {
                self.electronic_plus_enthalpy = Some(value);
            }
        } else if line.contains("Sum of electronic and zero-point Energies") {
            if let Some(value) = first_value_after(line, "=") {
                self.electronic_plus_zpe = Some(value);
            }
        } else if line.contains("nuclear repulsion energy") {
            self.feed_nuclear_repulsion(line);
        } else if line.contains("Frequencies") {
            self.feed_frequencies(line);
        } else if read_temperature && line.contains("Kelvin.  Pressure") {
            self.feed_temperature(line);
        } else if line.contains("scrf") {
            self.has_scrf = true;
        }
    }

    fn feed_nuclear_repulsion(&mut self, line: &str) {
        let Some(start) = line.find("nuclear repulsion energy") else {
            return;
        };
        let rest = &line[start + "nuclear repulsion energy".len()..];
        let value_str = match rest.find("Hartrees") {
            Some(end) => &rest[..end],
            None => rest,
        };
        match parse_f64(value_str) {
            Some(value) => self.nuclear_repulsion = Some(value),
            None => self.warnings.push(format!(
                "Could not parse nuclear repulsion energy from '{}'",
                line.trim_end()
            )),
        }
    }

    fn feed_frequencies(&mut self, line: &str) {
        let Some(dashes) = line.find("--") else {
            return;
        };
        for token in line[dashes + 2..].split_whitespace() {
            let Some(freq) = parse_f64(token) else {
                break;
            };
            if freq < 0.0 {
                self.negative_freqs.push(freq);
            } else {
                self.positive_freqs.push(freq);
            }
        }
    }

    fn feed_temperature(&mut self, line: &str) {
        let (Some(start), Some(end)) = (line.find("Temperature"), line.find("Kelvin")) else {
            return;
        };
        if start >= end {
            return;
        }
        let value_str = &line[start + "Temperature".len()..end];
        if value_str.trim().is_empty() {
            return;
        }
        match parse_f64(value_str) {
            Some(value) => self.temperature = Some(value),
            None => {
                self.warnings.push(format!(
                    "Could not parse temperature from '{}'. Using default {} K",
                    line.trim_end(),
                    FALLBACK_TEMPERATURE
                ));
                self.temperature = Some(FALLBACK_TEMPERATURE);
            }
        }
    }

    /// Electronic energy: the PCM-corrected value when present, else the
    /// TD/CIS total energy, else the last SCF value.
    pub fn electronic_energy(&self) -> f64 {
        self.pcm_energy
            .or(self.td_energy)
            .or_else(|| self.scf_values.last().copied())
            .unwrap_or(0.0)
    }

    /// Last SCF value alone, for low-level partner files.
    pub fn last_scf(&self) -> f64 {
        self.scf_values.last().copied().unwrap_or(0.0)
    }

    /// The reported "low frequency": the last negative frequency if any,
    /// else the minimum positive frequency, else zero.
    pub fn low_frequency(&self) -> f64 {
        if let Some(&last_negative) = self.negative_freqs.last() {
            return last_negative;
        }
        self.positive_freqs
            .iter()
            .copied()
            .fold(None::<f64>, |acc, f| match acc {
                Some(min) if min <= f => Some(min),
                _ => Some(f),
            })
            .unwrap_or(0.0)
    }

    pub fn has_imaginary_frequency(&self) -> bool {
        !self.negative_freqs.is_empty()
    }
}

/// First whitespace-delimited numeric token after the last byte of `marker`.
fn first_value_after(line: &str, marker: &str) -> Option<f64> {
    let pos = line.find(marker)? + marker.len();
    let token = line[pos..].split_whitespace().next()?;
    parse_f64(token)
}
