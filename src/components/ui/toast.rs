use crate::components::ui::{Button, ButtonSize, ButtonVariant};
use icons::X;
use leptos::prelude::*;
use leptos_ui::clx;

mod components {
    use super::*;
    clx! {ToastViewport, ol, "fixed bottom-4 right-4 z-50 flex w-80 flex-col gap-2"}
}

pub use components::*;

/// One notification with an optional action button.
#[component]
pub fn Toast(
    #[prop(into)] message: String,
    #[prop(into, optional)] action_label: Option<String>,
    #[prop(into, optional)] on_action: Option<Callback<()>>,
    #[prop(into, optional)] on_dismiss: Option<Callback<()>>,
) -> impl IntoView {
    view! {
        <li
            data-name="Toast"
            class="bg-card text-card-foreground flex items-center gap-2 rounded-lg border px-3 py-2 text-sm shadow-md"
            role="status"
        >
            <span class="min-w-0 flex-1 truncate">{message}</span>
            {action_label.map(|label| {
                view! {
                    <Button
                        variant=ButtonVariant::Outline
                        size=ButtonSize::Sm
                        on:click=move |_| {
                            if let Some(cb) = on_action {
                                cb.run(());
                            }
                        }
                    >
                        {label}
                    </Button>
                }
            })}
            {on_dismiss.map(|cb| {
                view! {
                    <Button
                        variant=ButtonVariant::Ghost
                        size=ButtonSize::Icon
                        attr:title="Dismiss"
                        on:click=move |_| cb.run(())
                    >
                        <X />
                    </Button>
                }
            })}
        </li>
    }
}
