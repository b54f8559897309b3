use std::sync::Arc;
use std::time::{Duration, Instant};

use ulid::Ulid;

use slotwise::{Engine, EngineConfig, InMemoryPeople, PersonStatus, Span, Status};

const HOUR: i64 = 3_600_000; // 1 hour in ms

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    if latencies.is_empty() {
        return;
    }
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.3}ms, p50={:.3}ms, p95={:.3}ms, p99={:.3}ms, max={:.3}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies[latencies.len() - 1].as_secs_f64() * 1000.0,
    );
}

fn open_engine(people: Arc<InMemoryPeople>) -> Engine {
    let env = EngineConfig::from_env();
    slotwise::observability::init_tracing(&env.log_filter);
    slotwise::observability::init_metrics(env.metrics_port).expect("metrics exporter");

    // Each run gets a fresh WAL so replay time stays out of the numbers.
    let config = EngineConfig {
        data_dir: env.data_dir.as_ref().map(|d| d.join(Ulid::new().to_string())),
        ..env
    };
    let (engine, _store) = Engine::open(&config, people).expect("open engine");
    engine
}

async fn phase1_sequential(engine: &Engine) {
    let owner = Ulid::new();
    let n = 2000;
    let mut latencies = Vec::with_capacity(n);
    let start = Instant::now();

    for i in 0..n {
        let s = (i as i64) * HOUR;
        let t = Instant::now();
        engine
            .insert(owner, Status::Available, Span::new(s, s + HOUR), None)
            .await
            .unwrap();
        latencies.push(t.elapsed());
    }

    let elapsed = start.elapsed();
    let ops = n as f64 / elapsed.as_secs_f64();
    println!("  {n} inserts in {:.2}s = {ops:.0} ops/sec", elapsed.as_secs_f64());
    print_latency("insert latency", &mut latencies);
}

async fn phase2_same_owner_contention(engine: Arc<Engine>) {
    let owner = Ulid::new();
    let n_tasks = 10;
    let n_per_task = 200;
    let start = Instant::now();

    let mut handles = Vec::new();
    for _ in 0..n_tasks {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            for j in 0..n_per_task {
                // Every task resubmits the same spans, so most inserts cancel something.
                let s = (j as i64) * HOUR;
                engine
                    .insert(owner, Status::Available, Span::new(s, s + HOUR), None)
                    .await
                    .unwrap();
            }
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    let elapsed = start.elapsed();
    let total = n_tasks * n_per_task;
    println!(
        "  {n_tasks} tasks x {n_per_task} inserts = {total} total in {:.2}s = {:.0} ops/sec",
        elapsed.as_secs_f64(),
        total as f64 / elapsed.as_secs_f64()
    );

    let live = engine
        .records_for_owner(owner)
        .await
        .unwrap()
        .iter()
        .filter(|r| r.status.is_live())
        .count();
    assert_eq!(live, n_per_task, "one live record per span");
}

async fn phase3_reads(engine: &Engine, people: &InMemoryPeople) {
    for _ in 0..200 {
        let owner = Ulid::new();
        people.set(owner, PersonStatus::Active);
        for d in 0..30 {
            let s = d * 24 * HOUR + 9 * HOUR;
            engine
                .insert(owner, Status::Available, Span::new(s, s + 8 * HOUR), None)
                .await
                .unwrap();
        }
    }

    let mut overlap = Vec::new();
    let mut daily = Vec::new();
    for d in 0..100 {
        let s = (d % 30) * 24 * HOUR + 10 * HOUR;
        let t = Instant::now();
        engine.query_overlapping(Span::new(s, s + HOUR)).await.unwrap();
        overlap.push(t.elapsed());

        if d % 10 == 0 {
            let t = Instant::now();
            engine.compute_daily_counts().await.unwrap();
            daily.push(t.elapsed());
        }
    }
    print_latency("overlap query latency", &mut overlap);
    print_latency("daily counts latency", &mut daily);
}

#[tokio::main]
async fn main() {
    let people = Arc::new(InMemoryPeople::new());
    let engine = Arc::new(open_engine(people.clone()));

    println!("phase 1: sequential inserts");
    phase1_sequential(&engine).await;

    println!("phase 2: concurrent same-owner resubmissions");
    phase2_same_owner_contention(engine.clone()).await;

    println!("phase 3: reads over 6000 records");
    phase3_reads(&engine, &people).await;
}
