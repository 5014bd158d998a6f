use std::{env, fs, path::Path};

use ts_rs::TS;

fn generate_types_content() -> String {
    let header = "// This file was generated by `cargo run --bin generate_types`.\n\
                  // Do not edit manually.\n";

    let decls: Vec<String> = vec![
        utils::response::ApiResponse::<()>::decl(),
        db::models::OrderDetailQuantity::decl(),
        db::models::user::UserRole::decl(),
        db::models::user::User::decl(),
        db::models::user::CreateUser::decl(),
        db::models::user::UpdateUser::decl(),
        db::models::step::Step::decl(),
        db::models::step::CreateStep::decl(),
        db::models::step::UpdateStep::decl(),
        db::models::machine::Machine::decl(),
        db::models::machine::CreateMachine::decl(),
        db::models::machine::UpdateMachine::decl(),
        db::models::detail::Detail::decl(),
        db::models::detail::CreateDetail::decl(),
        db::models::detail::UpdateDetail::decl(),
        db::models::order::Order::decl(),
        db::models::order::OrderEntry::decl(),
        db::models::order::OrderWithEntries::decl(),
        db::models::order::CreateOrderEntry::decl(),
        db::models::order::CreateOrder::decl(),
        db::models::order::UpdateOrder::decl(),
        db::models::report::Report::decl(),
        db::models::report::ReportEntry::decl(),
        db::models::report::ReportWithEntries::decl(),
        db::models::report::ShiftReportEntry::decl(),
        db::models::report::CreateReportEntry::decl(),
        db::models::report::CreateReport::decl(),
        db::models::plan::Plan::decl(),
        db::models::plan::PlanEntry::decl(),
        db::models::plan::PlanWithEntries::decl(),
        db::models::plan::CreatePlanEntry::decl(),
        db::models::plan::CreatePlan::decl(),
        db::models::board::Board::decl(),
        services::services::shift::ShiftKind::decl(),
        services::services::shift::Shift::decl(),
        services::services::shift::ShiftCell::decl(),
        services::services::shift::ShiftRow::decl(),
        services::services::shift::ShiftGrid::decl(),
        services::services::fulfillment::FulfillmentTotals::decl(),
        services::services::fulfillment::DetailFulfillment::decl(),
        services::services::fulfillment::OrderFulfillment::decl(),
        services::services::fulfillment::StepFulfillment::decl(),
        services::services::fulfillment::BalanceSource::decl(),
        services::services::fulfillment::BalancePoint::decl(),
        services::services::fulfillment::OrderBalance::decl(),
        services::services::shift_clock::BoardNavigation::decl(),
        services::services::catalog::DuplicateGroup::decl(),
        services::services::catalog::MergeSummary::decl(),
        server::routes::health::HealthStatus::decl(),
        server::routes::orders::SetOrderActive::decl(),
        server::routes::plans::UpdatePlanEntries::decl(),
    ];

    let body = decls
        .into_iter()
        .map(|d| {
            let trimmed = d.trim_start();
            if trimmed.starts_with("export") {
                d
            } else {
                format!("export {trimmed}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!("{header}\n{body}\n")
}

fn main() {
    let check_mode = env::args().any(|x| x == "--check");
    let shared_path = Path::new("shared");

    println!("Generating TypeScript types…");
    if let Err(e) = fs::create_dir_all(shared_path) {
        eprintln!("❌ cannot create {}: {e}", shared_path.display());
        std::process::exit(1);
    }

    let generated = generate_types_content();
    let types_path = shared_path.join("types.ts");

    if check_mode {
        let current = fs::read_to_string(&types_path).unwrap_or_default();
        if current == generated {
            println!("✅ shared/types.ts is up to date.");
            std::process::exit(0);
        } else {
            eprintln!("❌ shared/types.ts is not up to date. Run `cargo run --bin generate_types` and commit the changes.");
            std::process::exit(1);
        }
    }

    if let Err(e) = fs::write(&types_path, generated) {
        eprintln!("❌ cannot write {}: {e}", types_path.display());
        std::process::exit(1);
    }
    println!("✅ TypeScript types generated in shared/");
}
