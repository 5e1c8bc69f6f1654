//! Compute temperatures from raw sensor values.
//!
//! Follows the radiometric model of the [Thermimage R
//! library] (also used by [read_thermal.py]): the raw value
//! is corrected for emission of the atmosphere, the IR
//! window and reflections, then inverted through the
//! camera's Planck curve.
//!
//! [read_thermal.py]: //github.com/Nervengift/read_thermal.py/blob/master/flir_image_extractor.py
//! [Thermimage R library]: //github.com/gtatters/Thermimage/blob/master/R/raw2temp.R
use ndarray::Array2;
use serde_derive::*;

use crate::flir::FlirCameraParams;

/// Parameters to compute temperatures from raw sensor
/// values, as stored in the capture metadata.
///
/// Deserializes from ExifTool JSON (`exiftool -b -j`), where
/// temperatures carry a unit suffix (`"22.0 C"`).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct ThermalSettings {
    #[serde(
        rename = "RelativeHumidity",
        deserialize_with = "serde_helpers::float_with_suffix"
    )]
    pub relative_humidity_percentage: f64,

    pub emissivity: f64,
    #[serde(deserialize_with = "serde_helpers::float_with_suffix")]
    pub object_distance: f64,
    #[serde(deserialize_with = "serde_helpers::float_with_suffix")]
    pub reflected_apparent_temperature: f64,

    #[serde(
        rename = "IRWindowTemperature",
        deserialize_with = "serde_helpers::float_with_suffix"
    )]
    pub ir_window_temperature: f64,
    #[serde(rename = "IRWindowTransmission")]
    pub ir_window_transmission: f64,

    pub planck_r1: f64,
    pub planck_b: f64,
    pub planck_f: f64,
    pub planck_o: f64,
    pub planck_r2: f64,

    #[serde(deserialize_with = "serde_helpers::float_with_suffix")]
    pub atmospheric_temperature: f64,
    #[serde(rename = "AtmosphericTransAlpha1")]
    pub atmospheric_transmission_alpha_1: f64,
    #[serde(rename = "AtmosphericTransAlpha2")]
    pub atmospheric_transmission_alpha_2: f64,
    #[serde(rename = "AtmosphericTransBeta1")]
    pub atmospheric_transmission_beta_1: f64,
    #[serde(rename = "AtmosphericTransBeta2")]
    pub atmospheric_transmission_beta_2: f64,
    #[serde(rename = "AtmosphericTransX")]
    pub atmospheric_transmission_x: f64,
}

const CELSIUS_OFFSET: f64 = 273.15;

impl From<&FlirCameraParams> for ThermalSettings {
    fn from(params: &FlirCameraParams) -> Self {
        let t = &params.temperature_params;
        let e = &params.extra_params;
        let kelvin = |k: f32| k as f64 - CELSIUS_OFFSET;

        // Stored either as a fraction or as a percentage.
        let humidity = t.relative_humidity as f64;
        let relative_humidity_percentage = if humidity > 2. { humidity } else { humidity * 100. };

        ThermalSettings {
            relative_humidity_percentage,
            emissivity: t.emissivity as f64,
            object_distance: t.object_distance as f64,
            reflected_apparent_temperature: kelvin(t.reflected_apparent_temperature),
            ir_window_temperature: kelvin(t.ir_window_temperature),
            ir_window_transmission: t.ir_window_transmission as f64,
            planck_r1: t.planck_r1 as f64,
            planck_b: t.planck_b as f64,
            planck_f: t.planck_f as f64,
            planck_o: e.planck_o as f64,
            planck_r2: e.planck_r2 as f64,
            atmospheric_temperature: kelvin(t.atmospheric_temperature),
            atmospheric_transmission_alpha_1: t.atmospheric_transmission_alpha_1 as f64,
            atmospheric_transmission_alpha_2: t.atmospheric_transmission_alpha_2 as f64,
            atmospheric_transmission_beta_1: t.atmospheric_transmission_beta_1 as f64,
            atmospheric_transmission_beta_2: t.atmospheric_transmission_beta_2 as f64,
            atmospheric_transmission_x: t.atmospheric_transmission_x as f64,
        }
    }
}

impl ThermalSettings {
    // raw = PR1/(PR2*(exp(PB/(temp+273.15))-PF))-PO
    fn planck_temp_to_raw(&self, temp: f64) -> f64 {
        self.planck_r1
            / (self.planck_r2 * ((self.planck_b / (temp + CELSIUS_OFFSET)).exp() - self.planck_f))
            - self.planck_o
    }

    // inverse of above
    fn planck_raw_to_temp(&self, raw: f64) -> f64 {
        self.planck_b
            / (self.planck_r1 / (self.planck_r2 * (raw + self.planck_o)) + self.planck_f).ln()
            - CELSIUS_OFFSET
    }

    /// Transmission through air over half the object
    /// distance (the window sits half way).
    fn atmospheric_transmission(&self, distance: f64) -> f64 {
        // water vapour pressure from relative humidity
        const VAPOUR_SERIES: [f64; 4] = [1.5587, 0.06939, -0.00027816, 0.00000068455];
        let h2o = (self.relative_humidity_percentage / 100.)
            * power_series_at(&VAPOUR_SERIES, self.atmospheric_temperature).exp();
        let h2o_sqrt = h2o.sqrt();
        let dist_factor = (distance / 2.).sqrt();

        let tau1 = (-dist_factor
            * (self.atmospheric_transmission_alpha_1
                + self.atmospheric_transmission_beta_1 * h2o_sqrt))
            .exp();
        let tau2 = (-dist_factor
            * (self.atmospheric_transmission_alpha_2
                + self.atmospheric_transmission_beta_2 * h2o_sqrt))
            .exp();
        self.atmospheric_transmission_x * tau1 + (1. - self.atmospheric_transmission_x) * tau2
    }

    /// Affine map from the sensor's raw value to the raw value
    /// the object alone would have produced.
    pub fn raw_transform(&self, distance: f64) -> impl Fn(f64) -> f64 {
        let e = self.emissivity;
        let irt = self.ir_window_transmission;
        let tau = self.atmospheric_transmission(distance);

        let emiss_wind = 1. - irt;
        // anti-reflective coating on window
        let refl_wind = 0.;

        let refl = self.planck_temp_to_raw(self.reflected_apparent_temperature);
        let atm = self.planck_temp_to_raw(self.atmospheric_temperature);
        let wind = self.planck_temp_to_raw(self.ir_window_temperature);

        let refl1_attn = (1. - e) / e * refl;
        let atm1_attn = (1. - tau) / e / tau * atm;
        let wind_attn = emiss_wind / e / tau / irt * wind;
        let refl2_attn = refl_wind / e / tau / irt * refl;
        let atm2_attn = (1. - tau) / e / tau / irt / tau * atm;

        let coeffs = [
            -atm1_attn - atm2_attn - wind_attn - refl1_attn - refl2_attn,
            1. / e / tau / irt / tau,
        ];
        move |raw| power_series_at(&coeffs, raw)
    }

    pub fn temperature_transform(&self, distance: f64) -> impl Fn(f64) -> f64 + '_ {
        let t = self.raw_transform(distance);
        move |raw| self.planck_raw_to_temp(t(raw))
    }

    pub fn raw_to_temp(&self, distance: f64, raw: f64) -> f64 {
        self.temperature_transform(distance)(raw)
    }

    /// Temperatures in °C for a whole raw frame, at the
    /// object distance recorded with the capture.
    pub fn temperature_field(&self, raw: &Array2<f64>) -> Array2<f64> {
        let t = self.temperature_transform(self.object_distance);
        let mut field = raw.to_owned();
        field.par_mapv_inplace(t);
        field
    }
}

#[inline]
fn power_series_at(coeffs: &[f64], x: f64) -> f64 {
    let mut pow = 1.;
    let mut sum = 0.;
    for coeff in coeffs.iter() {
        sum += pow * coeff;
        pow *= x;
    }
    sum
}

mod serde_helpers {
    use lazy_static::lazy_static;
    use regex::Regex;
    use serde::*;
    use serde_derive::Deserialize;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(f64),
        String(String),
    }

    /// Accepts a plain number or a string starting with one
    /// (`"-3.5 C"`, `"1.00 m"`, `"50.0 %"`).
    pub fn float_with_suffix<'de, D>(de: D) -> Result<f64, D::Error>
    where
        D: Deserializer<'de>,
    {
        lazy_static! {
            static ref RE: Regex = Regex::new(r"^[-+]?\d*\.?\d+").unwrap();
        }

        use serde::de::Error;
        let str_rep = match NumberOrString::deserialize(de)? {
            NumberOrString::Number(val) => return Ok(val),
            NumberOrString::String(s) => s,
        };
        RE.find(str_rep.trim())
            .ok_or_else(|| Error::custom("unexpected format: must begin with float"))?
            .as_str()
            .parse()
            .map_err(Error::custom)
    }
}
