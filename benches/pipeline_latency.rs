// Pipeline latency benchmark
// Measures compile_and_run end to end, with a fake toolchain (pipeline
// overhead only) and with the host g++ when one is installed.

use cppbox::config::types::PipelineConfig;
use cppbox::pipeline::Pipeline;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::time::{Duration, Instant};

const ITERATIONS: usize = 50;
const WARMUP_ITERATIONS: usize = 5;

const FAKE_COMPILER: &str = "#!/bin/sh\n{ echo '#!/bin/sh'; cat \"$1\"; } > \"$3\"\nchmod +x \"$3\"\n";

/// Sorted request latencies
struct LatencyStats {
    sorted: Vec<Duration>,
}

impl LatencyStats {
    fn from_samples(mut samples: Vec<Duration>) -> Self {
        samples.sort();
        Self { sorted: samples }
    }

    /// Nearest-rank percentile, `q` in 0..=100
    fn percentile(&self, q: usize) -> Duration {
        let rank = (self.sorted.len() * q).div_ceil(100).max(1);
        self.sorted[rank - 1]
    }

    fn mean(&self) -> Duration {
        self.sorted.iter().sum::<Duration>() / self.sorted.len() as u32
    }

    fn print(&self) {
        println!(
            "  p50 {:?} | p95 {:?} | p99 {:?} | max {:?} | mean {:?}",
            self.percentile(50),
            self.percentile(95),
            self.percentile(99),
            self.percentile(100),
            self.mean()
        );
    }
}

struct BenchmarkResult {
    scenario: String,
    stats: LatencyStats,
    failures: usize,
    budget: (Duration, Duration),
}

impl BenchmarkResult {
    fn passed(&self) -> bool {
        self.failures == 0
            && self.stats.percentile(50) < self.budget.0
            && self.stats.percentile(95) < self.budget.1
    }

    fn print(&self) {
        println!("\n=== {} ===", self.scenario);
        self.stats.print();

        if self.passed() {
            println!("PASS");
        } else {
            println!(
                "FAIL: p50={:?} (target <{:?}), p95={:?} (target <{:?}), {} failed request(s)",
                self.stats.percentile(50),
                self.budget.0,
                self.stats.percentile(95),
                self.budget.1,
                self.failures
            );
        }
    }
}

fn measure(
    scenario: &str,
    pipeline: &Pipeline,
    code: &str,
    budget: (Duration, Duration),
) -> BenchmarkResult {
    for _ in 0..WARMUP_ITERATIONS {
        let _ = pipeline.compile_and_run(code, None);
    }

    let mut samples = Vec::with_capacity(ITERATIONS);
    let mut failures = 0;
    for _ in 0..ITERATIONS {
        let start = Instant::now();
        let result = pipeline.compile_and_run(code, None);
        samples.push(start.elapsed());
        if !result.success {
            failures += 1;
        }
    }

    BenchmarkResult {
        scenario: scenario.to_string(),
        stats: LatencyStats::from_samples(samples),
        failures,
        budget,
    }
}

fn fake_toolchain_pipeline(dir: &Path) -> Pipeline {
    let compiler = dir.join("fake-g++");
    std::fs::write(&compiler, FAKE_COMPILER).expect("write fake compiler");
    std::fs::set_permissions(&compiler, std::fs::Permissions::from_mode(0o755))
        .expect("chmod fake compiler");

    Pipeline::new(PipelineConfig {
        compiler_candidates: vec![compiler],
        scratch_dir: dir.join("scratch"),
        stale_workspace_max_age_secs: None,
        ..Default::default()
    })
    .expect("pipeline")
}

fn main() {
    println!("=== cppbox Pipeline Latency Benchmark ===");
    println!("Iterations: {} (after {} warmup)", ITERATIONS, WARMUP_ITERATIONS);

    let dir = tempfile::tempdir().expect("tempdir");
    let mut results = vec![measure(
        "Pipeline overhead (fake toolchain)",
        &fake_toolchain_pipeline(dir.path()),
        "echo 'Hello, World!'",
        (Duration::from_millis(50), Duration::from_millis(100)),
    )];

    let host = Pipeline::new(PipelineConfig {
        scratch_dir: dir.path().join("host-scratch"),
        stale_workspace_max_age_secs: None,
        ..Default::default()
    })
    .expect("pipeline");
    if host.toolchain().is_ok() {
        results.push(measure(
            "C++ Hello World (host g++)",
            &host,
            "#include <iostream>\nint main() { std::cout << \"Hello, World!\" << std::endl; }\n",
            (Duration::from_millis(1500), Duration::from_millis(3000)),
        ));
    } else {
        println!("\nNo host C++ compiler; skipping g++ scenario");
    }

    for result in &results {
        result.print();
    }

    let passed_count = results.iter().filter(|r| r.passed()).count();
    println!("\n=== Summary ===");
    println!("{}/{} scenarios passed", passed_count, results.len());

    if passed_count != results.len() {
        std::process::exit(1);
    }
}
