pub mod customer;
pub mod customer_order;
pub mod order;
pub mod order_item;
pub mod order_sequence;
pub mod product;
pub mod product_variant;
pub mod purchase_history;
pub mod size_stock;

pub use customer::Entity as Customer;
pub use customer_order::Entity as CustomerOrder;
pub use order::Entity as Order;
pub use order_item::Entity as OrderItem;
pub use order_sequence::Entity as OrderSequence;
pub use product::Entity as Product;
pub use product_variant::Entity as ProductVariant;
pub use purchase_history::Entity as PurchaseHistory;
pub use size_stock::Entity as SizeStock;
