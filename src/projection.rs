use sha2::{Digest, Sha256};

/// Dense random projection from one algorithm's native template space
/// onto the shared fused space.
///
/// Entries are `±1/sqrt(output_dim)`, drawn from SHA-256 of the scheme seed,
/// the algorithm name and a block counter, so every process that loads the
/// same scheme builds bit-identical matrices.
#[derive(Debug, Clone)]
pub struct Projection {
    input_dim: usize,
    output_dim: usize,
    /// Row-major `output_dim x input_dim`.
    matrix: Vec<f64>,
}

impl Projection {
    pub fn derive(seed: u64, algorithm: &str, input_dim: usize, output_dim: usize) -> Self {
        let total = input_dim * output_dim;
        let magnitude = 1.0 / (output_dim as f64).sqrt();
        let mut matrix = Vec::with_capacity(total);
        let mut block: u64 = 0;

        while matrix.len() < total {
            let mut hasher = Sha256::new();
            hasher.update(seed.to_le_bytes());
            hasher.update((algorithm.len() as u64).to_le_bytes());
            hasher.update(algorithm.as_bytes());
            hasher.update(block.to_le_bytes());
            let digest = hasher.finalize();

            for byte in digest.iter() {
                for bit in 0..8 {
                    if matrix.len() == total {
                        break;
                    }
                    let sign = if (byte >> bit) & 1 == 1 { magnitude } else { -magnitude };
                    matrix.push(sign);
                }
            }
            block += 1;
        }

        Self { input_dim, output_dim, matrix }
    }

    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    pub fn output_dim(&self) -> usize {
        self.output_dim
    }

    /// Adds `scale * M x` into `out`. `input` and `out` must match the matrix shape.
    pub fn accumulate(&self, input: &[f64], scale: f64, out: &mut [f64]) {
        for (row, target) in self.matrix.chunks_exact(self.input_dim).zip(out.iter_mut()) {
            let projected: f64 = row.iter().zip(input).map(|(m, x)| m * x).sum();
            *target += scale * projected;
        }
    }
}
