// WorkHole/backend-api/src/handlers/mod.rs
pub mod attendance_handlers;
pub mod break_handlers;
pub mod dashboard_handlers;
pub mod leave_handlers;
pub mod timer_handlers;

use actix_web::web;

/// Every route of the service except `/health`.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/attendance")
            .service(attendance_handlers::clock_in_handler)
            .service(attendance_handlers::clock_out_handler)
            .service(attendance_handlers::attendance_dashboard_handler)
            .service(attendance_handlers::attendance_stats_handler)
            .service(attendance_handlers::device_event_handler)
            .service(attendance_handlers::all_attendance_handler)
            .service(attendance_handlers::get_office_location_handler)
            .service(attendance_handlers::set_office_location_handler),
    )
    .service(
        web::scope("/breaks")
            .service(break_handlers::list_break_types_handler)
            .service(break_handlers::create_break_type_handler)
            .service(break_handlers::update_break_type_handler)
            .service(break_handlers::delete_break_type_handler)
            .service(break_handlers::start_break_handler)
            .service(break_handlers::stop_break_handler)
            .service(break_handlers::break_dashboard_handler)
            .service(break_handlers::break_history_handler)
            .service(break_handlers::active_break_count_handler),
    )
    .service(
        web::scope("/timers")
            .service(timer_handlers::start_timer_handler)
            .service(timer_handlers::current_timer_handler)
            .service(timer_handlers::timer_history_handler)
            .service(timer_handlers::timer_stats_handler)
            .service(timer_handlers::pause_timer_handler)
            .service(timer_handlers::resume_timer_handler)
            .service(timer_handlers::complete_timer_handler)
            .service(timer_handlers::cancel_timer_handler),
    )
    .service(
        // Literal admin paths are registered before `/{leave_id}`.
        web::scope("/leaves")
            .service(leave_handlers::create_leave_handler)
            .service(leave_handlers::my_leaves_handler)
            .service(leave_handlers::leave_stats_handler)
            .service(leave_handlers::all_leaves_handler)
            .service(leave_handlers::leave_action_handler)
            .service(leave_handlers::update_leave_handler)
            .service(leave_handlers::delete_leave_handler),
    )
    .service(web::scope("/dashboard").service(dashboard_handlers::home_dashboard_handler));
}
