use crate::model::{DatasetDescriptor, DatasetKind, TaxonomyDataset, TaxonomyItem};

/// Helper to build a category with display extras
fn category_with(id: &str, slug: &str, label: &str, plural: &str, icon: &str) -> TaxonomyItem {
    let mut item = TaxonomyItem::category(id, slug, label);
    item.plural = Some(plural.to_string());
    item.icon = Some(icon.to_string());
    item
}

fn service_items() -> Vec<TaxonomyItem> {
    vec![
        category_with("svc-home", "home", "Home", "Home services", "house"),
        TaxonomyItem::subcategory("svc-plumbing", "svc-home", "plumbing", "Plumbing"),
        TaxonomyItem::subdivision("svc-leaks", "svc-plumbing", "leak-repair", "Leak repair"),
        TaxonomyItem::subdivision("svc-drains", "svc-plumbing", "drain-cleaning", "Drain cleaning"),
        TaxonomyItem::subcategory("svc-electric", "svc-home", "electric", "Electric"),
        TaxonomyItem::subdivision("svc-wiring", "svc-electric", "wiring", "Wiring"),
        category_with("svc-garden", "garden", "Garden", "Garden services", "tree"),
        TaxonomyItem::subcategory("svc-landscaping", "svc-garden", "landscaping", "Landscaping"),
        // same slug as under Home: only siblings need distinct slugs
        TaxonomyItem::subcategory("svc-garden-plumbing", "svc-garden", "plumbing", "Irrigation plumbing"),
    ]
}

fn professional_items() -> Vec<TaxonomyItem> {
    let mut legal = category_with("pro-legal", "legal", "Legal", "Legal professionals", "scale");
    legal.description = Some("Lawyers, notaries and paralegals".to_string());
    vec![
        legal,
        TaxonomyItem::subcategory("pro-family-law", "pro-legal", "family-law", "Family law"),
        TaxonomyItem::subcategory("pro-notary", "pro-legal", "notary", "Notary"),
        category_with("pro-finance", "finance", "Finance", "Finance professionals", "coins"),
        TaxonomyItem::subcategory("pro-accounting", "pro-finance", "accounting", "Accounting"),
        TaxonomyItem::subdivision("pro-tax-returns", "pro-accounting", "tax-returns", "Tax returns"),
    ]
}

fn skill_items() -> Vec<TaxonomyItem> {
    vec![
        TaxonomyItem::skill("skill-welding", "welding", "Welding"),
        TaxonomyItem::skill("skill-carpentry", "carpentry", "Carpentry"),
        TaxonomyItem::skill("skill-bookkeeping", "bookkeeping", "Bookkeeping"),
    ]
}

fn tag_items() -> Vec<TaxonomyItem> {
    vec![
        TaxonomyItem::tag("tag-emergency", "emergency", "Emergency"),
        TaxonomyItem::tag("tag-eco", "eco-friendly", "Eco-friendly"),
        TaxonomyItem::tag("tag-licensed", "licensed", "Licensed"),
    ]
}

/// Sample content for a configured dataset. Hierarchy datasets other than the two
/// default ones start empty.
pub fn sample_dataset(descriptor: &DatasetDescriptor) -> TaxonomyDataset {
    let items = match (descriptor.kind, descriptor.name.as_str()) {
        (DatasetKind::Hierarchy, "service-taxonomy") => service_items(),
        (DatasetKind::Hierarchy, "professional-taxonomy") => professional_items(),
        (DatasetKind::Hierarchy, _) => Vec::new(),
        (DatasetKind::Skills, _) => skill_items(),
        (DatasetKind::Tags, _) => tag_items(),
    };
    TaxonomyDataset::new(descriptor.name.clone(), descriptor.kind, items)
}
