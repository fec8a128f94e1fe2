//! Clamped linear scales for the metric overlay.

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LinearScale {
	domain: (f64, f64),
	range: (f64, f64),
}

impl LinearScale {
	pub fn new(domain: (f64, f64), range: (f64, f64)) -> Self {
		Self { domain, range }
	}

	/// Values outside the domain map to the nearest range end. A degenerate
	/// domain maps everything to the upper end.
	pub fn apply(&self, value: f64) -> f64 {
		let (d0, d1) = self.domain;
		let (r0, r1) = self.range;
		let span = d1 - d0;
		if span.abs() <= f64::EPSILON {
			return r1;
		}
		let t = ((value - d0) / span).clamp(0.0, 1.0);
		r0 + t * (r1 - r0)
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rgb {
	pub r: u8,
	pub g: u8,
	pub b: u8,
}

impl Rgb {
	pub const fn new(r: u8, g: u8, b: u8) -> Self {
		Self { r, g, b }
	}

	pub fn lerp(self, other: Rgb, t: f64) -> Rgb {
		let t = t.clamp(0.0, 1.0);
		let mix = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * t).round() as u8;
		Rgb::new(mix(self.r, other.r), mix(self.g, other.g), mix(self.b, other.b))
	}

	pub fn rgba(&self, alpha: f64) -> String {
		format!("rgba({}, {}, {}, {})", self.r, self.g, self.b, alpha)
	}
}

/// Piecewise-linear colour ramp over three domain stops.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ColorScale {
	stops: [(f64, Rgb); 3],
}

impl ColorScale {
	pub fn new(domain: [f64; 3], colors: [Rgb; 3]) -> Self {
		Self {
			stops: [
				(domain[0], colors[0]),
				(domain[1], colors[1]),
				(domain[2], colors[2]),
			],
		}
	}

	/// The ramp used for degree halos: `[0, 0.3 * max, max]`.
	pub fn for_max(max: f64, colors: [Rgb; 3]) -> Self {
		Self::new([0.0, 0.3 * max, max], colors)
	}

	pub fn apply(&self, value: f64) -> Rgb {
		let [(d0, c0), (d1, c1), (d2, c2)] = self.stops;
		if value <= d0 {
			return c0;
		}
		if value >= d2 {
			return c2;
		}
		if value <= d1 {
			let span = d1 - d0;
			if span <= f64::EPSILON {
				return c1;
			}
			c0.lerp(c1, (value - d0) / span)
		} else {
			let span = d2 - d1;
			if span <= f64::EPSILON {
				return c2;
			}
			c1.lerp(c2, (value - d1) / span)
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn linear_scale_clamps_at_both_ends() {
		let scale = LinearScale::new((0.0, 10.0), (8.0, 40.0));
		assert_eq!(scale.apply(-3.0), 8.0);
		assert_eq!(scale.apply(5.0), 24.0);
		assert_eq!(scale.apply(10.0), 40.0);
		assert_eq!(scale.apply(25.0), 40.0);
	}

	#[test]
	fn linear_scale_is_monotonic() {
		let scale = LinearScale::new((0.0, 7.0), (8.0, 40.0));
		let radii: Vec<f64> = (0..10).map(|v| scale.apply(v as f64)).collect();
		assert!(radii.windows(2).all(|w| w[0] <= w[1]));
	}

	#[test]
	fn color_scale_hits_its_stops() {
		let (low, mid, high) = (Rgb::new(0, 0, 255), Rgb::new(0, 255, 0), Rgb::new(255, 0, 0));
		let scale = ColorScale::for_max(10.0, [low, mid, high]);
		assert_eq!(scale.apply(0.0), low);
		assert_eq!(scale.apply(3.0), mid);
		assert_eq!(scale.apply(10.0), high);
		assert_eq!(scale.apply(50.0), high);
		assert_eq!(scale.apply(6.5), Rgb::new(128, 128, 0));
	}
}
