//! Parametric Family Catalog
//!
//! The closed set of families shared by the fitter and the reference
//! sampler. Every family is a standard form `S(shape)` combined with a
//! location/scale transform:
//!
//!   X = loc + scale · S
//!
//! Parameter names follow the usual convention of shape parameters first,
//! then `loc` and `scale`.

use serde::{Deserialize, Serialize};
use statrs::distribution::{
    Cauchy, ChiSquared, Continuous, ContinuousCDF, Exp, Gamma, LogNormal, Normal, Uniform,
    Weibull,
};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Parametric families available for fitting and sampling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DistributionKind {
    #[serde(rename = "norm", alias = "normal")]
    Normal,
    #[serde(rename = "expon", alias = "exponential")]
    Exponential,
    #[serde(rename = "gamma")]
    Gamma,
    #[serde(rename = "lognorm", alias = "lognormal")]
    LogNormal,
    #[serde(rename = "chi2", alias = "chisquared")]
    ChiSquared,
    #[serde(rename = "cauchy")]
    Cauchy,
    #[serde(rename = "rayleigh")]
    Rayleigh,
    #[serde(rename = "uniform")]
    Uniform,
    #[serde(rename = "weibull_min", alias = "weibull")]
    Weibull,
}

impl DistributionKind {
    /// Default catalog of common families, in evaluation order
    pub const COMMON: [DistributionKind; 9] = [
        Self::Normal,
        Self::Exponential,
        Self::Gamma,
        Self::LogNormal,
        Self::ChiSquared,
        Self::Cauchy,
        Self::Rayleigh,
        Self::Uniform,
        Self::Weibull,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Normal => "norm",
            Self::Exponential => "expon",
            Self::Gamma => "gamma",
            Self::LogNormal => "lognorm",
            Self::ChiSquared => "chi2",
            Self::Cauchy => "cauchy",
            Self::Rayleigh => "rayleigh",
            Self::Uniform => "uniform",
            Self::Weibull => "weibull_min",
        }
    }

    /// Full parameter schema: shape parameters, then `loc`, `scale`
    pub fn param_names(&self) -> &'static [&'static str] {
        match self {
            Self::Gamma => &["a", "loc", "scale"],
            Self::LogNormal => &["s", "loc", "scale"],
            Self::ChiSquared => &["df", "loc", "scale"],
            Self::Weibull => &["c", "loc", "scale"],
            Self::Normal | Self::Exponential | Self::Cauchy | Self::Rayleigh | Self::Uniform => {
                &["loc", "scale"]
            }
        }
    }

    /// Name of the single shape parameter, if the family has one
    pub fn shape_name(&self) -> Option<&'static str> {
        match self {
            Self::Gamma => Some("a"),
            Self::LogNormal => Some("s"),
            Self::ChiSquared => Some("df"),
            Self::Weibull => Some("c"),
            _ => None,
        }
    }

    /// Number of free parameters (used for information criteria)
    pub fn param_count(&self) -> usize {
        self.param_names().len()
    }
}

impl fmt::Display for DistributionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Returned when a family name does not match any catalog entry
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown distribution family `{0}`")]
pub struct UnknownDistribution(pub String);

impl FromStr for DistributionKind {
    type Err = UnknownDistribution;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "norm" | "normal" => Ok(Self::Normal),
            "expon" | "exponential" => Ok(Self::Exponential),
            "gamma" => Ok(Self::Gamma),
            "lognorm" | "lognormal" => Ok(Self::LogNormal),
            "chi2" | "chisquared" => Ok(Self::ChiSquared),
            "cauchy" => Ok(Self::Cauchy),
            "rayleigh" => Ok(Self::Rayleigh),
            "uniform" => Ok(Self::Uniform),
            "weibull_min" | "weibull" => Ok(Self::Weibull),
            _ => Err(UnknownDistribution(s.to_string())),
        }
    }
}

/// Missing or out-of-domain distribution parameters
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParameterError {
    #[error("{kind} requires parameter `{name}`")]
    Missing {
        kind: DistributionKind,
        name: &'static str,
    },

    #[error("invalid {kind} parameter `{name}` = {value}: {reason}")]
    Invalid {
        kind: DistributionKind,
        name: &'static str,
        value: f64,
        reason: &'static str,
    },
}

/// Result of fitting one family to one sample
///
/// `params` holds exactly the names returned by
/// [`DistributionKind::param_names`] for `kind`. `error` is the
/// sum-of-squared deviation between the fitted density and the sample
/// histogram.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedDistribution {
    pub kind: DistributionKind,
    pub params: BTreeMap<String, f64>,
    pub error: f64,
}

impl FittedDistribution {
    pub(crate) fn from_parameters(kind: DistributionKind, params: Parameters, error: f64) -> Self {
        let mut map = BTreeMap::new();
        if let (Some(name), Some(shape)) = (kind.shape_name(), params.shape) {
            map.insert(name.to_string(), shape);
        }
        map.insert("loc".to_string(), params.loc);
        map.insert("scale".to_string(), params.scale);
        Self {
            kind,
            params: map,
            error,
        }
    }

    pub fn param(&self, name: &str) -> Option<f64> {
        self.params.get(name).copied()
    }

    pub fn loc(&self) -> Option<f64> {
        self.param("loc")
    }

    pub fn scale(&self) -> Option<f64> {
        self.param("scale")
    }

    /// Typed view of `params`, validated against the family's schema
    pub fn parameters(&self) -> Result<Parameters, ParameterError> {
        Parameters::resolve(self.kind, &self.params)
    }
}

/// Typed, validated parameter set of one family
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Parameters {
    pub shape: Option<f64>,
    pub loc: f64,
    pub scale: f64,
}

impl Parameters {
    pub fn new(shape: Option<f64>, loc: f64, scale: f64) -> Self {
        Self { shape, loc, scale }
    }

    /// Pull the family's parameters out of a loosely-typed map.
    ///
    /// Entries outside the schema are ignored.
    pub fn resolve(
        kind: DistributionKind,
        params: &BTreeMap<String, f64>,
    ) -> Result<Self, ParameterError> {
        let lookup = |name: &'static str| {
            params
                .get(name)
                .copied()
                .ok_or(ParameterError::Missing { kind, name })
        };

        let shape = kind.shape_name().map(lookup).transpose()?;
        let resolved = Self {
            shape,
            loc: lookup("loc")?,
            scale: lookup("scale")?,
        };
        resolved.validate(kind)?;
        Ok(resolved)
    }

    pub fn validate(&self, kind: DistributionKind) -> Result<(), ParameterError> {
        let invalid = |name, value, reason| ParameterError::Invalid {
            kind,
            name,
            value,
            reason,
        };

        if !self.loc.is_finite() {
            return Err(invalid("loc", self.loc, "must be finite"));
        }
        if !self.scale.is_finite() || self.scale <= 0.0 {
            return Err(invalid("scale", self.scale, "must be positive and finite"));
        }
        match (kind.shape_name(), self.shape) {
            (Some(name), Some(shape)) if !shape.is_finite() || shape <= 0.0 => {
                Err(invalid(name, shape, "must be positive and finite"))
            }
            (Some(name), None) => Err(ParameterError::Missing { kind, name }),
            _ => Ok(()),
        }
    }
}

/// Standard (loc = 0, scale = 1) form of each family
#[derive(Debug, Clone)]
enum StandardForm {
    Normal(Normal),
    Exponential(Exp),
    Gamma(Gamma),
    LogNormal(LogNormal),
    ChiSquared(ChiSquared),
    Cauchy(Cauchy),
    // Rayleigh(σ = 1) is Weibull(k = 2, λ = √2)
    Rayleigh(Weibull),
    Uniform(Uniform),
    Weibull(Weibull),
}

macro_rules! with_standard {
    ($form:expr, $d:ident => $body:expr) => {
        match $form {
            StandardForm::Normal($d) => $body,
            StandardForm::Exponential($d) => $body,
            StandardForm::Gamma($d) => $body,
            StandardForm::LogNormal($d) => $body,
            StandardForm::ChiSquared($d) => $body,
            StandardForm::Cauchy($d) => $body,
            StandardForm::Rayleigh($d) => $body,
            StandardForm::Uniform($d) => $body,
            StandardForm::Weibull($d) => $body,
        }
    };
}

/// Evaluable density/CDF of a parameterised family
#[derive(Debug, Clone)]
pub struct Model {
    kind: DistributionKind,
    params: Parameters,
    standard: StandardForm,
}

impl Model {
    pub fn new(kind: DistributionKind, params: Parameters) -> Result<Self, ParameterError> {
        params.validate(kind)?;

        let shape = params.shape.unwrap_or(1.0);
        let rejected = || ParameterError::Invalid {
            kind,
            name: kind.shape_name().unwrap_or("scale"),
            value: shape,
            reason: "rejected by the family's constructor",
        };

        let standard = match kind {
            DistributionKind::Normal => {
                StandardForm::Normal(Normal::new(0.0, 1.0).map_err(|_| rejected())?)
            }
            DistributionKind::Exponential => {
                StandardForm::Exponential(Exp::new(1.0).map_err(|_| rejected())?)
            }
            DistributionKind::Gamma => {
                StandardForm::Gamma(Gamma::new(shape, 1.0).map_err(|_| rejected())?)
            }
            DistributionKind::LogNormal => StandardForm::LogNormal(
                LogNormal::new(0.0, shape).map_err(|_| rejected())?,
            ),
            DistributionKind::ChiSquared => StandardForm::ChiSquared(
                ChiSquared::new(shape).map_err(|_| rejected())?,
            ),
            DistributionKind::Cauchy => {
                StandardForm::Cauchy(Cauchy::new(0.0, 1.0).map_err(|_| rejected())?)
            }
            DistributionKind::Rayleigh => StandardForm::Rayleigh(
                Weibull::new(2.0, std::f64::consts::SQRT_2).map_err(|_| rejected())?,
            ),
            DistributionKind::Uniform => {
                StandardForm::Uniform(Uniform::new(0.0, 1.0).map_err(|_| rejected())?)
            }
            DistributionKind::Weibull => StandardForm::Weibull(
                Weibull::new(shape, 1.0).map_err(|_| rejected())?,
            ),
        };

        Ok(Self {
            kind,
            params,
            standard,
        })
    }

    pub fn kind(&self) -> DistributionKind {
        self.kind
    }

    pub fn parameters(&self) -> Parameters {
        self.params
    }

    fn standardize(&self, x: f64) -> f64 {
        (x - self.params.loc) / self.params.scale
    }

    pub fn pdf(&self, x: f64) -> f64 {
        let z = self.standardize(x);
        with_standard!(&self.standard, d => d.pdf(z)) / self.params.scale
    }

    /// Log-density; `-inf` outside the support
    pub fn ln_pdf(&self, x: f64) -> f64 {
        let z = self.standardize(x);
        with_standard!(&self.standard, d => d.ln_pdf(z)) - self.params.scale.ln()
    }

    pub fn cdf(&self, x: f64) -> f64 {
        let z = self.standardize(x);
        with_standard!(&self.standard, d => d.cdf(z))
    }
}
