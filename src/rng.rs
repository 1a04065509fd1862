use rand::thread_rng;
use rand_distr::{Distribution, Normal, Uniform};

/// Samples `length` values for a freshly created store variable, gaussian
/// around `mean` or uniform in `[mean - stdev, mean + stdev]`.
pub fn vec_f32(length: usize, mean: f32, stdev: f32, use_gaussian: bool) -> Vec<f32> {
    let mut rng = thread_rng();

    if use_gaussian {
        let dist = Normal::new(mean, stdev).unwrap();
        (0..length).map(|_| dist.sample(&mut rng)).collect()
    } else {
        let dist = Uniform::new(mean - stdev, mean + stdev);
        (0..length).map(|_| dist.sample(&mut rng)).collect()
    }
}
