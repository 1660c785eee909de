//! Orb viewer demo application
//!
//! Renders a spinning textured sphere in a desktop window while the HMD
//! render loop waits for a headset in the background. Arrow keys orbit the
//! camera, WASD spins the sphere, +/- zooms.

use glfw::{Action, Key, WindowEvent};
use stereo_engine::foundation::logging;
use stereo_engine::prelude::*;

const ORBIT_STEP: f32 = 0.08;
const SPIN_STEP: f32 = 0.06;
const ZOOM_STEP: f32 = 0.25;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init();
    log::info!("Starting orb viewer");

    let mut engine = Engine::new(EngineConfig {
        app_name: "orb_viewer".to_string(),
        window_title: "Orb Viewer".to_string(),
        ..EngineConfig::default()
    })?;

    engine.set_lights(vec![
        Light::directional(Vec3::new(-0.5, -1.0, -0.8), Vec3::new(0.9, 0.9, 0.85)),
        Light::point(Vec3::new(3.0, 2.0, 2.0), Vec3::new(0.4, 0.45, 0.6)),
    ]);

    // No vendor runtime linked in; the HMD loop idles until one exists.
    engine.start_vr(StubDriver::new())?;

    while !engine.window().should_close() {
        engine.window_mut().poll_events();

        let events: Vec<WindowEvent> = engine
            .window()
            .flush_events()
            .map(|(_, event)| event)
            .collect();
        for event in events {
            handle_event(&mut engine, &event);
        }

        engine.draw_frame()?;
    }

    log::info!("Window closed, shutting down");
    Ok(())
}

fn handle_event(engine: &mut Engine, event: &WindowEvent) {
    let WindowEvent::Key(key, _, action, _) = event else {
        return;
    };
    if *action == Action::Release {
        return;
    }

    match key {
        Key::Escape => engine.window_mut().set_should_close(true),

        // Camera orbit and zoom.
        Key::Left => engine.camera_mut().orbit(-ORBIT_STEP, 0.0),
        Key::Right => engine.camera_mut().orbit(ORBIT_STEP, 0.0),
        Key::Up => engine.camera_mut().orbit(0.0, ORBIT_STEP),
        Key::Down => engine.camera_mut().orbit(0.0, -ORBIT_STEP),
        Key::Equal => engine.camera_mut().zoom(-ZOOM_STEP),
        Key::Minus => engine.camera_mut().zoom(ZOOM_STEP),

        // Spin the shared object; the HMD view sees the same rotation.
        Key::A => engine.rotate_object(Quat::from_euler_angles(0.0, 0.0, SPIN_STEP)),
        Key::D => engine.rotate_object(Quat::from_euler_angles(0.0, 0.0, -SPIN_STEP)),
        Key::W => engine.rotate_object(Quat::from_euler_angles(SPIN_STEP, 0.0, 0.0)),
        Key::S => engine.rotate_object(Quat::from_euler_angles(-SPIN_STEP, 0.0, 0.0)),

        _ => {}
    }
}
