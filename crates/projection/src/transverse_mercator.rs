//! Transverse Mercator projection.
//!
//! Series expansion after Snyder, "Map Projections: A Working Manual"
//! (USGS PP 1395), eqs. 8-9 to 8-25. Accurate to the millimetre within a
//! few degrees of the central meridian, which covers Gauss-Krüger
//! (3° zones) and UTM (6° zones).

use crate::Ellipsoid;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransverseMercator {
    pub ellipsoid: Ellipsoid,
    /// Central meridian in degrees
    pub lon0: f64,
    /// Scale factor on the central meridian
    pub k0: f64,
    pub false_easting: f64,
    pub false_northing: f64,
}

impl TransverseMercator {
    /// Gauss-Krüger zone `zone` on the Bessel ellipsoid (central meridian
    /// `3 * zone` degrees, false easting `zone * 1e6 + 500 000`).
    pub fn gauss_krueger(zone: u8) -> Self {
        Self {
            ellipsoid: Ellipsoid::BESSEL_1841,
            lon0: 3.0 * zone as f64,
            k0: 1.0,
            false_easting: zone as f64 * 1_000_000.0 + 500_000.0,
            false_northing: 0.0,
        }
    }

    /// UTM zone `zone`, northern hemisphere, on GRS 80.
    pub fn utm_north(zone: u8) -> Self {
        Self {
            ellipsoid: Ellipsoid::GRS80,
            lon0: 6.0 * zone as f64 - 183.0,
            k0: 0.9996,
            false_easting: 500_000.0,
            false_northing: 0.0,
        }
    }

    /// Project geographic coordinates (degrees) to easting/northing.
    pub fn forward(&self, lat: f64, lon: f64) -> (f64, f64) {
        let el = &self.ellipsoid;
        let e2 = el.e2();
        let ep2 = el.ep2();
        let phi = lat.to_radians();
        let (sin_phi, cos_phi) = phi.sin_cos();

        let n = el.a / (1.0 - e2 * sin_phi * sin_phi).sqrt();
        let t = phi.tan().powi(2);
        let c = ep2 * cos_phi * cos_phi;
        let a = (lon - self.lon0).to_radians() * cos_phi;
        let m = el.meridian_arc(phi);

        let x = self.k0
            * n
            * (a + (1.0 - t + c) * a.powi(3) / 6.0
                + (5.0 - 18.0 * t + t * t + 72.0 * c - 58.0 * ep2) * a.powi(5) / 120.0);
        let y = self.k0
            * (m + n
                * phi.tan()
                * (a * a / 2.0
                    + (5.0 - t + 9.0 * c + 4.0 * c * c) * a.powi(4) / 24.0
                    + (61.0 - 58.0 * t + t * t + 600.0 * c - 330.0 * ep2) * a.powi(6) / 720.0));

        (x + self.false_easting, y + self.false_northing)
    }

    /// Convert easting/northing back to geographic coordinates `(lat, lon)`
    /// in degrees.
    pub fn inverse(&self, easting: f64, northing: f64) -> (f64, f64) {
        let el = &self.ellipsoid;
        let e2 = el.e2();
        let ep2 = el.ep2();
        let e4 = e2 * e2;
        let e6 = e4 * e2;

        let x = easting - self.false_easting;
        let m = (northing - self.false_northing) / self.k0;
        let mu = m / (el.a * (1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0));

        let root = (1.0 - e2).sqrt();
        let e1 = (1.0 - root) / (1.0 + root);
        let phi1 = mu
            + (3.0 * e1 / 2.0 - 27.0 * e1.powi(3) / 32.0) * (2.0 * mu).sin()
            + (21.0 * e1 * e1 / 16.0 - 55.0 * e1.powi(4) / 32.0) * (4.0 * mu).sin()
            + (151.0 * e1.powi(3) / 96.0) * (6.0 * mu).sin()
            + (1097.0 * e1.powi(4) / 512.0) * (8.0 * mu).sin();

        let (sin1, cos1) = phi1.sin_cos();
        let c1 = ep2 * cos1 * cos1;
        let t1 = phi1.tan().powi(2);
        let w = 1.0 - e2 * sin1 * sin1;
        let n1 = el.a / w.sqrt();
        let r1 = el.a * (1.0 - e2) / w.powf(1.5);
        let d = x / (n1 * self.k0);

        let phi = phi1
            - (n1 * phi1.tan() / r1)
                * (d * d / 2.0
                    - (5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1 * c1 - 9.0 * ep2) * d.powi(4) / 24.0
                    + (61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1 * t1 - 252.0 * ep2 - 3.0 * c1 * c1)
                        * d.powi(6)
                        / 720.0);
        let lambda = (d - (1.0 + 2.0 * t1 + c1) * d.powi(3) / 6.0
            + (5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1 * c1 + 8.0 * ep2 + 24.0 * t1 * t1)
                * d.powi(5)
                / 120.0)
            / cos1;

        (phi.to_degrees(), self.lon0 + lambda.to_degrees())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_utils::assert_approx_eq;

    #[test]
    fn test_gauss_krueger_central_meridian() {
        let gk3 = TransverseMercator::gauss_krueger(3);
        let (e, n) = gk3.forward(51.0, 9.0);
        assert_approx_eq!(e, 3_500_000.0, 1e-6);
        assert_approx_eq!(n, 5_651_505.56, 0.05);
    }

    #[test]
    fn test_utm32_forward() {
        let utm = TransverseMercator::utm_north(32);
        assert_eq!(utm.lon0, 9.0);
        let (e, n) = utm.forward(52.0, 7.0);
        assert_approx_eq!(e, 362_705.63, 0.05);
        assert_approx_eq!(n, 5_762_926.81, 0.05);
    }

    #[test]
    fn test_inverse_recovers_geographic() {
        for tm in [
            TransverseMercator::gauss_krueger(2),
            TransverseMercator::gauss_krueger(4),
            TransverseMercator::utm_north(32),
        ] {
            for (lat, lon) in [(51.8, tm.lon0 + 1.3), (47.6, tm.lon0 - 1.1), (54.9, tm.lon0)] {
                let (e, n) = tm.forward(lat, lon);
                let (lat2, lon2) = tm.inverse(e, n);
                assert_approx_eq!(lat, lat2, 1e-8);
                assert_approx_eq!(lon, lon2, 1e-8);
            }
        }
    }
}
