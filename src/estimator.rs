use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum EstimatorError {
    #[error("cannot interpolate between two samples at the same key {0}")]
    CoincidentKeys(f64),
}

/// Incremental ordinary least squares fit of `y = intercept + slope * x`.
#[derive(Debug, Clone, Default)]
pub struct Regression {
    n: usize,
    sum_x: f64,
    sum_y: f64,
    sum_xx: f64,
    sum_xy: f64,
    intercept: f64,
    slope: f64,
}

impl Regression {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, x: f64, y: f64) {
        self.n += 1;
        self.sum_x += x;
        self.sum_y += y;
        self.sum_xx += x * x;
        self.sum_xy += x * y;

        let n = self.n as f64;
        if self.n < 2 {
            self.intercept = y;
            return;
        }
        let denominator = n * self.sum_xx - self.sum_x * self.sum_x;
        // every x identical: the best horizontal fit is the mean
        self.slope = if denominator == 0.0 {
            0.0
        } else {
            (n * self.sum_xy - self.sum_x * self.sum_y) / denominator
        };
        self.intercept = self.sum_y / n - self.slope * self.sum_x / n;
    }

    pub fn samples(&self) -> usize {
        self.n
    }
}

/// Scalar estimate of one anchoring component as a function of the order key.
#[derive(Debug, Clone)]
pub enum Estimator {
    Regression(Regression),
    Interpolation { x1: f64, y1: f64, x2: f64, y2: f64 },
}

impl Estimator {
    /// Line through two known points.
    ///
    /// # Errors
    ///
    /// Returns [`EstimatorError::CoincidentKeys`] if `x1 == x2`.
    pub fn interpolation(x1: f64, y1: f64, x2: f64, y2: f64) -> Result<Self, EstimatorError> {
        if x1 == x2 {
            return Err(EstimatorError::CoincidentKeys(x1));
        }
        Ok(Self::Interpolation { x1, y1, x2, y2 })
    }

    /// One interpolation per component between two component vectors.
    ///
    /// # Errors
    ///
    /// Returns [`EstimatorError::CoincidentKeys`] if `x1 == x2`.
    pub fn interpolations<const N: usize>(
        x1: f64,
        y1: &[f64; N],
        x2: f64,
        y2: &[f64; N],
    ) -> Result<[Self; N], EstimatorError> {
        if x1 == x2 {
            return Err(EstimatorError::CoincidentKeys(x1));
        }
        Ok(std::array::from_fn(|i| Self::Interpolation {
            x1,
            y1: y1[i],
            x2,
            y2: y2[i],
        }))
    }

    pub fn evaluate(&self, x: f64) -> f64 {
        match self {
            Self::Regression(fit) => fit.intercept + fit.slope * x,
            Self::Interpolation { x1, y1, x2, y2 } => {
                if x == *x2 {
                    return *y2;
                }
                y1 + (y2 - y1) * (x - x1) / (x2 - x1)
            }
        }
    }
}
