use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rust_decimal::Decimal;
use std::sync::Arc;
use storefront::{
  CartLine, CartService, Customer, MemoryStore, OrderEngine, OrderLine, OrderRequest, PaymentReconciler, VariantId,
};
use tokio::runtime::Runtime; // To run async code within Criterion

// Large enough that no benchmark run exhausts it.
const BENCH_STOCK: u32 = u32::MAX / 2;

fn request(variants: &[VariantId]) -> OrderRequest {
  OrderRequest {
    customer: Customer {
      name: "Bench Customer".to_string(),
      email: "bench@example.com".to_string(),
      phone: "0700000000".to_string(),
    },
    shipping_address: "Bench Lane 1, Nairobi".to_string(),
    items: variants
      .iter()
      .map(|&variant_id| OrderLine {
        product_id: None,
        variant_id,
        quantity: 1,
      })
      .collect(),
  }
}

async fn seeded_store(variant_count: usize) -> (MemoryStore, Vec<VariantId>) {
  let store = MemoryStore::new();
  let product = store.add_product("Bench Product").await;
  let mut variants = Vec::with_capacity(variant_count);
  for i in 0..variant_count {
    variants.push(
      store
        .add_variant(product, &format!("Variant {}", i), Decimal::new(1_250, 2), BENCH_STOCK)
        .await,
    );
  }
  (store, variants)
}

fn bench_order_creation(c: &mut Criterion) {
  let mut group = c.benchmark_group("OrderCreate");
  let rt = Runtime::new().unwrap();

  for lines in [1usize, 5, 20].iter() {
    let (store, variants) = rt.block_on(seeded_store(*lines));
    let engine = OrderEngine::new(Arc::new(store));
    let order = request(&variants);

    group.throughput(Throughput::Elements(*lines as u64));
    group.bench_with_input(BenchmarkId::new("lines", lines), lines, |b, _| {
      b.to_async(&rt).iter(|| {
        let engine = engine.clone();
        let order = order.clone();
        async move { engine.create(order).await.unwrap() }
      });
    });
  }
  group.finish();
}

fn bench_cart_validation(c: &mut Criterion) {
  let mut group = c.benchmark_group("CartValidate");
  let rt = Runtime::new().unwrap();

  for lines in [1usize, 20].iter() {
    let (store, variants) = rt.block_on(seeded_store(*lines));
    let cart = CartService::new(Arc::new(store));
    let cart_lines: Vec<CartLine> = variants
      .iter()
      .map(|&variant_id| CartLine { variant_id, quantity: 2 })
      .collect();

    group.bench_with_input(BenchmarkId::new("lines", lines), lines, |b, _| {
      b.to_async(&rt).iter(|| {
        let cart = cart.clone();
        let cart_lines = cart_lines.clone();
        async move { cart.validate_cart(&cart_lines).await.unwrap() }
      });
    });
  }
  group.finish();
}

fn bench_unmatched_callback(c: &mut Criterion) {
  let mut group = c.benchmark_group("Reconcile");
  let rt = Runtime::new().unwrap();
  let reconciler = PaymentReconciler::new(Arc::new(MemoryStore::new()));
  let payload = br#"{"Body":{"stkCallback":{"MerchantRequestID":"bench","CheckoutRequestID":"ws_CO_1","ResultCode":1032,"ResultDesc":"Request cancelled by user"}}}"#;

  // Parse, lock and miss: the cost every duplicate or stray callback pays.
  group.bench_function("unknown_payment", |b| {
    b.to_async(&rt).iter(|| {
      let reconciler = reconciler.clone();
      async move { reconciler.reconcile(payload).await.unwrap_err() }
    });
  });
  group.finish();
}

criterion_group!(
  benches,
  bench_order_creation,
  bench_cart_validation,
  bench_unmatched_callback
);
criterion_main!(benches);
