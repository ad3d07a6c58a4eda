use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use geoquad::{CoastLine, Geodetic, Icosahedron, LayerKind, LayerLimits, MapDb, Tile};
use tempfile::TempDir;

fn open(dir: &TempDir, tile_bytes: usize) -> MapDb {
    MapDb::builder()
        .storage_path(dir.path())
        .max_nodes(4_096)
        .max_total_layer_bytes(1 << 28)
        .layer_limits(LayerKind::CoastLine, LayerLimits::new(tile_bytes, 1 << 28))
        .build()
        .unwrap()
}

fn coastline(lat: f64, lon: f64, points: usize) -> CoastLine {
    let mut coast = CoastLine::new();
    coast
        .add((0..points).map(|i| Geodetic::surface(lat + i as f64 * 0.001, lon + i as f64 * 0.001)))
        .unwrap();
    coast
}

fn benchmark_geometry(c: &mut Criterion) {
    let mut group = c.benchmark_group("geometry");
    let roots = Icosahedron::get().root_tiles();
    let point = Geodetic::surface(35.0, 139.0).to_ecef();

    group.bench_function("locate_root", |b| {
        b.iter(|| Tile::locate(black_box(&roots), black_box(&point)))
    });

    group.bench_function("subdivide", |b| b.iter(|| black_box(&roots[7]).subdivide()));

    group.bench_function("intersects_circle", |b| {
        b.iter(|| roots[7].intersects_circle(black_box(&point), black_box(50_000.0)))
    });

    group.finish();
}

fn benchmark_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert");

    for points in [10, 100, 1_000] {
        group.bench_with_input(BenchmarkId::new("coastline", points), &points, |b, &points| {
            let dir = TempDir::new().unwrap();
            let mut db = open(&dir, 64 * 1024);
            let mut counter = 0u32;
            b.iter(|| {
                let lat = -60.0 + (counter % 120) as f64;
                let lon = -180.0 + (counter % 360) as f64;
                counter = counter.wrapping_add(7);
                db.insert(black_box(coastline(lat, lon, points).into())).unwrap()
            })
        });
    }

    group.finish();
}

fn benchmark_request(c: &mut Criterion) {
    let mut group = c.benchmark_group("request");
    let dir = TempDir::new().unwrap();
    let mut db = open(&dir, 16 * 1024);

    for lat in (-60..60).step_by(3) {
        for lon in (-180..180).step_by(6) {
            db.insert(coastline(lat as f64, lon as f64, 20).into()).unwrap();
        }
    }

    for radius in [1_000.0, 100_000.0, 1_000_000.0] {
        group.bench_with_input(BenchmarkId::new("radius", radius as u64), &radius, |b, &radius| {
            b.iter(|| {
                db.request(
                    &[LayerKind::CoastLine],
                    black_box(&Geodetic::surface(35.0, 139.0)),
                    radius,
                    0.0,
                )
                .unwrap()
            })
        });
    }

    group.bench_function("restruct_and_save", |b| {
        b.iter(|| {
            db.restruct().unwrap();
            db.save().unwrap()
        })
    });

    group.finish();
}

criterion_group!(benches, benchmark_geometry, benchmark_insert, benchmark_request);
criterion_main!(benches);
