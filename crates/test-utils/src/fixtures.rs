//! Common test fixtures for terrain server tests.

/// Bounding boxes used across the test suite, as `(xmin, ymin, xmax, ymax)`.
pub mod bbox {
    /// 10 km x 10 km box in Gauss-Krüger zone 2 near Münster (EPSG:31466).
    pub const GK2_10KM: (f64, f64, f64, f64) = (2_590_000.0, 5_740_000.0, 2_600_000.0, 5_750_000.0);

    /// 50 km x 50 km box in UTM 32N, 2500 km², larger than the default limit.
    pub const UTM32_50KM: (f64, f64, f64, f64) = (400_000.0, 5_700_000.0, 450_000.0, 5_750_000.0);

    /// 1 km x 1 km box in UTM 32N.
    pub const UTM32_1KM: (f64, f64, f64, f64) = (400_000.0, 5_700_000.0, 401_000.0, 5_701_000.0);

    /// Geographic box around Münster (EPSG:4326).
    pub const MUENSTER_LATLON: (f64, f64, f64, f64) = (7.55, 51.90, 7.70, 51.99);
}

/// Default service limits.
pub mod limits {
    /// Maximum destination area in m² (1000 km²).
    pub const MAX_AREA_M2: f64 = 1.0e9;

    /// Minimum metric cell size.
    pub const MIN_CELL_SIZE: f64 = 50.0;
}
