//! Page Tracking Benchmarks
//!
//! Current-page lookup runs on every scroll event, so it has to stay cheap
//! for long documents.
//!
//! Run with: `cargo bench --bench page_tracking`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use folio_preview::render::{PageLayout, PAGE_GAP};

/// Mixed portrait and landscape pages
fn layout(page_count: usize) -> PageLayout {
    PageLayout::from_heights(
        (0..page_count).map(|i| if i % 7 == 0 { 612.0 } else { 792.0 }),
        PAGE_GAP,
    )
}

fn bench_current_page(c: &mut Criterion) {
    let mut group = c.benchmark_group("current_page");

    for page_count in [10usize, 500, 5000] {
        let layout = layout(page_count);
        let total = layout.total_height();

        group.bench_with_input(
            BenchmarkId::from_parameter(page_count),
            &layout,
            |b, layout| {
                let mut scroll_top = 0.0_f32;
                b.iter(|| {
                    scroll_top = (scroll_top + 137.0) % total;
                    black_box(layout.current_page(black_box(scroll_top), 900.0))
                })
            },
        );
    }

    group.finish();
}

fn bench_build_layout(c: &mut Criterion) {
    c.bench_function("build_layout_500", |b| {
        b.iter(|| black_box(layout(black_box(500))))
    });
}

criterion_group!(benches, bench_current_page, bench_build_layout);
criterion_main!(benches);
